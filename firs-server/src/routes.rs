use crate::error::AppError;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use firs_core::invoice::{InvoiceRequest, project, render_html};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct SimulateResponse {
    pub irn: String,
    pub qr_code_base64: String,
    pub signed_xml: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub irn: String,
    pub valid: bool,
}

/// `POST /simulate-firs`: render, sign, store and return the invoice with its QR code.
pub async fn simulate_firs(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<InvoiceRequest>, JsonRejection>,
) -> Result<Json<SimulateResponse>, AppError> {
    let Json(request) = body.map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))?;
    let irn = request.irn().to_string();
    let view_url = state.view_url(&headers, &irn);

    let pipeline = state.pipeline.clone();
    let qr = state.qr.clone();
    let (request, signed_xml, qr_code_base64) = tokio::task::spawn_blocking(move || {
        let signed = pipeline.issue(&request).map_err(firs_core::Error::from)?;
        let qr_code = qr.encode_base64(&view_url).map_err(firs_core::Error::from)?;
        Ok::<_, firs_core::Error>((request, signed, qr_code))
    })
    .await
    .map_err(|err| AppError::Process(err.to_string()))??;

    state.store.put(&irn, signed_xml.clone(), request);
    info!(irn = %irn, bytes = signed_xml.len(), "invoice issued");

    Ok(Json(SimulateResponse {
        irn,
        qr_code_base64,
        signed_xml,
    }))
}

/// `GET /invoice/view/:irn`
pub async fn view_invoice(
    State(state): State<AppState>,
    Path(irn): Path<String>,
) -> Result<Html<String>, AppError> {
    let stored = state.store.get(&irn)?;
    let model = project(&stored.signed_xml).map_err(|err| AppError::View(err.to_string()))?;
    Ok(Html(render_html(&model, &irn)))
}

/// `GET /invoice/pdf/:irn`: prints the view page through the PDF collaborator.
pub async fn invoice_pdf(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(irn): Path<String>,
) -> Result<Response, AppError> {
    state.store.get(&irn)?;
    let url = state.view_url(&headers, &irn);
    let pdf = state
        .pdf
        .render_pdf(&url)
        .await
        .map_err(|err| AppError::Pdf(err.to_string()))?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=invoice_{irn}.pdf"))
        .map_err(|err| AppError::Pdf(err.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

/// `GET /invoice/xml/:irn`: the stored signed document, unchanged.
pub async fn invoice_xml(
    State(state): State<AppState>,
    Path(irn): Path<String>,
) -> Result<Response, AppError> {
    let stored = state.store.get(&irn)?;
    Ok((
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        stored.signed_xml.clone(),
    )
        .into_response())
}

/// `GET /invoice/verify/:irn`: re-checks the stored signature against the server key.
pub async fn verify_invoice(
    State(state): State<AppState>,
    Path(irn): Path<String>,
) -> Result<Json<VerifyResponse>, AppError> {
    let stored = state.store.get(&irn)?;
    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.verify(&stored.signed_xml))
        .await
        .map_err(|err| AppError::Process(err.to_string()))?;
    if let Err(err) = &outcome {
        warn!(irn = %irn, error = %err, "stored invoice failed verification");
    }
    Ok(Json(VerifyResponse {
        irn,
        valid: outcome.is_ok(),
    }))
}

pub async fn health() -> &'static str {
    "ok"
}
