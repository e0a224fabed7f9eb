use firs_core::invoice::{
    DEFAULT_TEMPLATE, InvoiceRequest, InvoiceSigner, Template, UnmatchedPlaceholders,
};
use firs_core::InvoicePipeline;
use std::fs;
use std::path::{Path, PathBuf};

#[allow(dead_code)]
pub fn fixture_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

#[allow(dead_code)]
pub fn read_fixture(relative: &str) -> String {
    fs::read_to_string(fixture_path(relative)).expect("read fixture")
}

#[allow(dead_code)]
pub fn request(name: &str) -> InvoiceRequest {
    InvoiceRequest::from_json(&read_fixture(&format!("requests/{name}.json"))).expect("request")
}

#[allow(dead_code)]
pub fn signer() -> InvoiceSigner {
    InvoiceSigner::from_pem(&read_fixture("keys/signing-key.pem")).expect("signer")
}

#[allow(dead_code)]
pub fn default_pipeline() -> InvoicePipeline {
    InvoicePipeline::new(Template::parse(DEFAULT_TEMPLATE).expect("template"), signer())
}

#[allow(dead_code)]
pub fn simplified_pipeline() -> InvoicePipeline {
    let template = Template::from_file(fixture_path("templates/simplified.xml"))
        .expect("template")
        .with_unmatched(UnmatchedPlaceholders::Remove);
    InvoicePipeline::new(template, signer())
}
