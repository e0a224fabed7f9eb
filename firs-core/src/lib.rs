//! Core of the FIRS e-invoicing simulator: template rendering, enveloped
//! XML-DSig signing, the invoice store and the presentation builder.
//!
//! # Examples
//! ```rust
//! use firs_core::invoice::{InvoiceRequest, Template, DEFAULT_TEMPLATE};
//!
//! let template = Template::parse(DEFAULT_TEMPLATE)?;
//! let xml = template.render(&InvoiceRequest::new("INV001"));
//! assert!(xml.contains("<cbc:ID>INV001</cbc:ID>"));
//! # Ok::<(), firs_core::Error>(())
//! ```
pub mod config;
pub mod invoice;
pub mod pipeline;
pub mod store;

use thiserror::Error;

pub use config::{Config, ConfigError};
pub use pipeline::InvoicePipeline;
pub use store::{InvoiceStore, StoreError, StoredInvoice};

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Request(#[from] invoice::RequestError),
    #[error(transparent)]
    Template(#[from] invoice::TemplateError),
    #[error(transparent)]
    Xml(#[from] invoice::xml::XmlError),
    #[error(transparent)]
    C14n(#[from] invoice::xml::c14n::C14nError),
    #[error(transparent)]
    Signing(#[from] invoice::SigningError),
    #[error(transparent)]
    Verification(#[from] invoice::VerificationError),
    #[error(transparent)]
    Qr(#[from] invoice::QrCodeError),
    #[error(transparent)]
    Projection(#[from] invoice::ProjectionError),
    #[error(transparent)]
    Store(#[from] store::StoreError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
