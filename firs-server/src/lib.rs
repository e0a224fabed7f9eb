//! HTTP service boundary for the FIRS e-invoicing simulator.
//!
//! Handlers are thin: every invoice operation lives in `firs-core`, the
//! router only adapts it to HTTP and maps errors to generic responses.

pub mod config;
pub mod error;
pub mod pdf;
pub mod routes;
pub mod state;

pub use config::ServerArgs;
pub use error::AppError;
pub use pdf::{ChromePdfRenderer, PdfError, PdfRenderer};
pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/simulate-firs", post(routes::simulate_firs))
        .route("/invoice/view/:irn", get(routes::view_invoice))
        .route("/invoice/pdf/:irn", get(routes::invoice_pdf))
        .route("/invoice/xml/:irn", get(routes::invoice_xml))
        .route("/invoice/verify/:irn", get(routes::verify_invoice))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
