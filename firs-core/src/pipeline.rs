//! Render-then-sign composition shared by the server and the CLI.
use crate::config::{Config, read_file};
use crate::invoice::{
    InvoiceRequest, InvoiceSigner, InvoiceVerifier, SigningError, Template, VerificationError,
};
use crate::Error;
use tracing::{debug, info};

/// A loaded template plus signing key, ready to issue invoices.
pub struct InvoicePipeline {
    template: Template,
    signer: InvoiceSigner,
    verifier: InvoiceVerifier,
}

impl InvoicePipeline {
    pub fn new(template: Template, signer: InvoiceSigner) -> Self {
        let verifier = signer.verifier();
        Self {
            template,
            signer,
            verifier,
        }
    }

    /// Load the template and key material named by `config`.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let template = Template::from_file(config.template_path())?.with_unmatched(config.unmatched());
        let key_pem = read_file(config.private_key_path())?;
        let signer = match config.certificate_path() {
            Some(path) => InvoiceSigner::from_pem_with_certificate(&key_pem, &read_file(path)?)?,
            None => InvoiceSigner::from_pem(&key_pem)?,
        }
        .with_c14n(config.c14n());
        info!(
            template = %config.template_path().display(),
            c14n = %config.c14n(),
            unmatched = %config.unmatched(),
            certificate = config.certificate_path().is_some(),
            "invoice pipeline ready"
        );
        Ok(Self::new(template, signer))
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn signer(&self) -> &InvoiceSigner {
        &self.signer
    }

    pub fn render(&self, request: &InvoiceRequest) -> String {
        let xml = self.template.render(request);
        debug!(irn = %request.irn(), lines = request.lines().len(), "rendered invoice");
        xml
    }

    /// Render `request` and sign the result.
    pub fn issue(&self, request: &InvoiceRequest) -> Result<String, SigningError> {
        let xml = self.render(request);
        self.signer.sign_xml(&xml)
    }

    pub fn verify(&self, signed_xml: &str) -> Result<(), VerificationError> {
        self.verifier.verify(signed_xml)
    }
}
