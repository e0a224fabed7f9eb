mod common;

use firs_core::invoice::xml::parse_document;
use firs_core::invoice::{
    Group, InvoiceRequest, Section, VerificationError, project, render_html,
};
use firs_core::{Config, InvoicePipeline, InvoiceStore, StoreError};
use std::fs;

#[test]
fn round_trip_exposes_request_fields() {
    let pipeline = common::default_pipeline();
    for name in ["inv001", "full"] {
        let request = common::request(name);
        let signed = pipeline.issue(&request).expect("issue");
        let model = project(&signed).expect("project");

        let supplier = request
            .section(Section::AccountingSupplierParty)
            .expect("supplier");
        let customer = request
            .section(Section::AccountingCustomerParty)
            .expect("customer");
        let totals = request.section(Section::LegalMonetaryTotal).expect("totals");
        assert_eq!(model.irn, request.irn());
        assert_eq!(Some(model.supplier.name.as_str()), supplier.get("party_name"));
        assert_eq!(Some(model.supplier.tax_id.as_str()), supplier.get("tin"));
        assert_eq!(Some(model.customer.name.as_str()), customer.get("party_name"));
        assert_eq!(
            Some(model.totals.payable.value.as_str()),
            totals.get("payable_amount")
        );
        assert_eq!(model.lines.len(), request.lines().len());
        for (view, line) in model.lines.iter().zip(request.lines()) {
            assert_eq!(Some(view.name.as_str()), line.get("item_name"));
            assert_eq!(Some(view.price.value.as_str()), line.get("price"));
        }
    }
}

#[test]
fn full_request_projects_addresses_and_currencies() {
    let signed = common::default_pipeline()
        .issue(&common::request("full"))
        .expect("issue");
    let model = project(&signed).expect("project");
    assert_eq!(model.currency, "NGN");
    assert_eq!(model.note, "Thanks for your business & prompt payment");
    assert_eq!(model.customer.name, "Beta Retail <Abuja>");
    assert_eq!(model.customer.city, "Abuja");
    assert_eq!(model.supplier.email, "billing@acme.example");
    assert_eq!(model.totals.tax_inclusive.to_string(), "1612.50 NGN");
    let second = &model.lines[1];
    assert_eq!(second.id, "2");
    assert_eq!(second.quantity, "1");
    assert_eq!(second.unit_code, "EA");
    assert_eq!(second.line_total.to_string(), "500.00 NGN");

    let html = render_html(&model, &model.irn);
    assert!(html.contains("Beta Retail &lt;Abuja&gt;"));
}

#[test]
fn repeated_signing_verifies_every_time() {
    let pipeline = common::default_pipeline();
    let request = common::request("full");
    let first = pipeline.issue(&request).expect("first");
    let second = pipeline.issue(&request).expect("second");
    pipeline.verify(&first).expect("verify first");
    pipeline.verify(&second).expect("verify second");
    assert_eq!(first, second);
}

#[test]
fn body_mutations_break_verification() {
    let pipeline = common::default_pipeline();
    let signed = pipeline.issue(&common::request("inv001")).expect("issue");

    let name = "<cbc:Name>Acme</cbc:Name>";
    let start = signed.find(name).expect("supplier name") + "<cbc:Name>".len();
    for offset in 0.."Acme".len() {
        let mut bytes = signed.clone().into_bytes();
        bytes[start + offset] = b'X';
        let tampered = String::from_utf8(bytes).expect("utf8");
        assert!(matches!(
            pipeline.verify(&tampered),
            Err(VerificationError::DigestMismatch)
        ));
    }

    let tampered = signed.replacen("<cbc:PayableAmount currencyID", "<cbc:PayableAmount currencyId", 1);
    assert!(pipeline.verify(&tampered).is_err());

    let dropped_line = {
        let start = signed.find("<cac:InvoiceLine>").expect("line");
        let end = signed.find("</cac:InvoiceLine>").expect("line end") + "</cac:InvoiceLine>".len();
        format!("{}{}", &signed[..start], &signed[end..])
    };
    assert!(matches!(
        pipeline.verify(&dropped_line),
        Err(VerificationError::DigestMismatch)
    ));
}

#[test]
fn block_expands_once_per_line_in_order() {
    let pipeline = common::default_pipeline();
    for count in [0usize, 1, 3] {
        let mut request = InvoiceRequest::new("CARD");
        for n in 0..count {
            request = request.with_line(Group::new().with("item_name", format!("item-{n}")));
        }
        let xml = pipeline.render(&request);
        let doc = parse_document(&xml).expect("parse rendered");
        let lines: Vec<_> = doc
            .root()
            .child_elements()
            .filter(|element| element.local_name() == "InvoiceLine")
            .collect();
        assert_eq!(lines.len(), count);
        for (n, line) in lines.iter().enumerate() {
            assert_eq!(line.child("ID").map(|id| id.text()), Some((n + 1).to_string()));
            assert_eq!(
                line.find_path(&["Item", "Name"]).map(|name| name.text()),
                Some(format!("item-{n}"))
            );
        }
    }
}

#[test]
fn missing_group_keeps_tokens_and_still_signs() {
    let pipeline = common::default_pipeline();
    let request = InvoiceRequest::new("NOTOTALS").with_section(
        Section::AccountingSupplierParty,
        Group::new().with("party_name", "Acme"),
    );
    let signed = pipeline.issue(&request).expect("issue");
    assert!(signed.contains(
        "<cbc:PayableAmount currencyID=\"{{document_currency_code}}\">{{legal_monetary_total.payable_amount}}</cbc:PayableAmount>"
    ));
    pipeline.verify(&signed).expect("verify");
    let model = project(&signed).expect("project");
    assert_eq!(model.supplier.name, "Acme");
    assert_eq!(model.totals.payable.value, "{{legal_monetary_total.payable_amount}}");
}

#[test]
fn simplified_template_projects_by_local_name() {
    let pipeline = common::simplified_pipeline();
    let signed = pipeline.issue(&common::request("inv001")).expect("issue");
    pipeline.verify(&signed).expect("verify");

    let model = project(&signed).expect("project");
    assert_eq!(model.supplier.name, "Acme");
    assert_eq!(model.supplier.tax_id, "123");
    assert_eq!(model.customer.name, "Beta");
    assert_eq!(model.customer.tax_id, "456");
    assert_eq!(model.totals.payable.value, "1000.00");
    assert_eq!(model.totals.payable.currency, "");
    assert_eq!(model.lines.len(), 1);
    assert_eq!(model.lines[0].name, "Widget");
}

#[test]
fn store_keeps_latest_signed_invoice() {
    let pipeline = common::default_pipeline();
    let store = InvoiceStore::new();
    let first = common::request("inv001");
    let second = InvoiceRequest::from_json(
        r#"{"irn":"INV001","accounting_supplier_party":{"party_name":"Acme Two"}}"#,
    )
    .expect("request");

    store.put(first.irn(), pipeline.issue(&first).expect("first"), first.clone());
    let doc_b = pipeline.issue(&second).expect("second");
    store.put(second.irn(), doc_b.clone(), second.clone());

    let stored = store.get("INV001").expect("stored");
    assert_eq!(stored.signed_xml, doc_b);
    assert_eq!(stored.request, second);
    pipeline.verify(&stored.signed_xml).expect("verify stored");
    assert!(matches!(
        store.get("missing-irn"),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn pipeline_loads_from_config_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let template = dir.path().join("invoice.xml");
    let key = dir.path().join("private.pem");
    fs::write(&template, common::read_fixture("templates/simplified.xml")).expect("template");
    fs::write(&key, common::read_fixture("keys/signing-key-pkcs1.pem")).expect("key");

    let config = Config::new(&template, &key).with_certificate(common::fixture_path("keys/signing-cert.pem"));
    let pipeline = InvoicePipeline::from_config(&config).expect("pipeline");
    let signed = pipeline.issue(&common::request("inv001")).expect("issue");
    assert!(signed.contains("<X509Certificate>"));
    pipeline.verify(&signed).expect("verify");

    let missing = Config::new(dir.path().join("nope.xml"), &key);
    assert!(matches!(
        InvoicePipeline::from_config(&missing),
        Err(firs_core::Error::Template(_))
    ));
    let mismatched = Config::new(&template, common::fixture_path("keys/other-key.pem"))
        .with_certificate(common::fixture_path("keys/signing-cert.pem"));
    assert!(matches!(
        InvoicePipeline::from_config(&mismatched),
        Err(firs_core::Error::Signing(_))
    ));
}
