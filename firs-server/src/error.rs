//! HTTP error mapping. Diagnostic detail is logged, never sent to clients.
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use firs_core::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON error body: `{"error": "..."}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Unknown IRN (404, plain text).
    #[error("invoice {0} not found")]
    NotFound(String),
    /// Body is not a valid invoice request (400, JSON).
    #[error("invalid invoice request: {0}")]
    InvalidRequest(String),
    /// Render, sign or QR failure (500, JSON).
    #[error("failed to process invoice: {0}")]
    Process(String),
    /// Stored document could not be projected (500, plain text).
    #[error("failed to render invoice: {0}")]
    View(String),
    /// PDF collaborator failure (500, plain text).
    #[error("failed to generate PDF: {0}")]
    Pdf(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Process(_) | Self::View(_) | Self::Pdf(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::NotFound(_) | Self::InvalidRequest(_) => tracing::debug!(error = %self, "client error"),
            _ => tracing::error!(error = %self, "request failed"),
        }

        match self {
            Self::NotFound(_) => (status, "Invoice not found").into_response(),
            Self::InvalidRequest(_) => json_error(status, "Invalid invoice request"),
            Self::Process(_) => json_error(status, "Failed to process invoice"),
            Self::View(_) => (status, "Failed to render invoice").into_response(),
            Self::Pdf(_) => (status, "Failed to generate PDF").into_response(),
        }
    }
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { irn } => Self::NotFound(irn),
        }
    }
}

impl From<firs_core::Error> for AppError {
    fn from(err: firs_core::Error) -> Self {
        Self::Process(err.to_string())
    }
}
