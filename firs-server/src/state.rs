use crate::pdf::PdfRenderer;
use axum::http::{HeaderMap, header};
use firs_core::invoice::{PngQrEncoder, QrEncoder, encode_path_segment};
use firs_core::{InvoicePipeline, InvoiceStore};
use std::sync::Arc;

/// Shared application state handed to every handler.
///
/// The pipeline (template and key material) is read-only after startup;
/// the store is the only mutable shared state and guards itself.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InvoicePipeline>,
    pub store: Arc<InvoiceStore>,
    pub qr: Arc<dyn QrEncoder>,
    pub pdf: Arc<dyn PdfRenderer>,
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(pipeline: InvoicePipeline, pdf: impl PdfRenderer + 'static) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store: Arc::new(InvoiceStore::new()),
            qr: Arc::new(PngQrEncoder::default()),
            pdf: Arc::new(pdf),
            public_base_url: None,
        }
    }

    pub fn with_qr(mut self, qr: impl QrEncoder + 'static) -> Self {
        self.qr = Arc::new(qr);
        self
    }

    pub fn with_public_base_url(mut self, base_url: Option<String>) -> Self {
        self.public_base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        self
    }

    /// Base URL for links back to this service: the configured public URL,
    /// else `http://<Host>`.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_base_url {
            return url.clone();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{host}")
    }

    /// Absolute URL of the HTML view, with `irn` as an encoded path segment.
    pub fn view_url(&self, headers: &HeaderMap, irn: &str) -> String {
        format!(
            "{}/invoice/view/{}",
            self.base_url(headers),
            encode_path_segment(irn)
        )
    }
}
