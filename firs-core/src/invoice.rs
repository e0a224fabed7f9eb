//! Invoice rendering, signing and presentation.
pub mod qr;
pub mod request;
pub mod sign;
pub mod template;
pub mod view;
pub mod xml;

pub use qr::{PngQrEncoder, QrCodeError, QrEncoder, QrResult};
pub use request::{Group, InvoiceRequest, RequestError, Section};
pub use sign::{InvoiceSigner, InvoiceVerifier, SigningError, VerificationError};
pub use template::{Template, TemplateError, UnmatchedPlaceholders};
pub use view::{DisplayModel, ProjectionError, encode_path_segment, project, render_html};
pub use xml::c14n::C14nMethod;
pub use xml::constants::DEFAULT_TEMPLATE;
