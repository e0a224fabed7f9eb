//! Projection of a signed invoice into a display model and its HTML page.
use crate::invoice::xml::constants::DS_NS;
use crate::invoice::xml::{Element, NamespaceScope, XmlError, parse_document};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use quick_xml::escape::escape;
use serde::Serialize;
use std::fmt::{self, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("signed invoice cannot be parsed: {0}")]
    Malformed(#[from] XmlError),
}

/// A monetary value and its `currencyID`; both empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.value.is_empty(), self.currency.is_empty()) {
            (false, false) => write!(f, "{} {}", self.value, self.currency),
            (false, true) => f.write_str(&self.value),
            (true, _) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartyView {
    pub name: String,
    pub tax_id: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub postal_zone: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub quantity: String,
    pub unit_code: String,
    pub price: Amount,
    pub line_total: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TotalsView {
    pub line_extension: Amount,
    pub tax_exclusive: Amount,
    pub tax_inclusive: Amount,
    pub payable: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignatureView {
    pub canonicalization: String,
    pub digest_value: String,
    pub signature_value: String,
    pub has_certificate: bool,
}

/// Read-only view of a signed invoice for HTML/PDF rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayModel {
    pub irn: String,
    pub issue_date: String,
    pub due_date: String,
    pub currency: String,
    pub note: String,
    pub supplier: PartyView,
    pub customer: PartyView,
    pub lines: Vec<LineView>,
    pub totals: TotalsView,
    pub signature: Option<SignatureView>,
}

/// Parse `signed_xml` and project it into a [`DisplayModel`].
///
/// Elements are matched by local name so prefixed UBL and simplified
/// unprefixed documents project the same way. Absent nodes become empty
/// strings.
pub fn project(signed_xml: &str) -> Result<DisplayModel, ProjectionError> {
    let doc = parse_document(signed_xml)?;
    let root = doc.root();

    Ok(DisplayModel {
        irn: text_at(root, &["ID"]),
        issue_date: text_at(root, &["IssueDate"]),
        due_date: text_at(root, &["DueDate"]),
        currency: text_at(root, &["DocumentCurrencyCode"]),
        note: text_at(root, &["Note"]),
        supplier: root
            .child("AccountingSupplierParty")
            .map(party)
            .unwrap_or_default(),
        customer: root
            .child("AccountingCustomerParty")
            .map(party)
            .unwrap_or_default(),
        lines: invoice_lines(root).into_iter().map(line).collect(),
        totals: root
            .child("LegalMonetaryTotal")
            .map(|totals| TotalsView {
                line_extension: amount_at(totals, &["LineExtensionAmount"]),
                tax_exclusive: amount_at(totals, &["TaxExclusiveAmount"]),
                tax_inclusive: amount_at(totals, &["TaxInclusiveAmount"]),
                payable: amount_at(totals, &["PayableAmount"]),
            })
            .unwrap_or_default(),
        signature: signature(root),
    })
}

fn party(wrapper: &Element) -> PartyView {
    let party = wrapper.child("Party").unwrap_or(wrapper);
    PartyView {
        name: first_text(
            party,
            &[
                &["Name"],
                &["PartyName", "Name"],
                &["PartyLegalEntity", "RegistrationName"],
            ],
        ),
        tax_id: first_text(
            party,
            &[
                &["CompanyID"],
                &["PartyTaxScheme", "CompanyID"],
                &["PartyLegalEntity", "CompanyID"],
            ],
        ),
        email: first_text(party, &[&["ElectronicMail"], &["Contact", "ElectronicMail"]]),
        street: text_at(party, &["PostalAddress", "StreetName"]),
        city: text_at(party, &["PostalAddress", "CityName"]),
        postal_zone: text_at(party, &["PostalAddress", "PostalZone"]),
        country: text_at(party, &["PostalAddress", "Country", "IdentificationCode"]),
    }
}

/// Every `InvoiceLine` directly under the root or one wrapper level down,
/// in document order.
fn invoice_lines(root: &Element) -> Vec<&Element> {
    let mut lines = Vec::new();
    for element in root.child_elements() {
        if element.local_name() == "InvoiceLine" {
            lines.push(element);
        } else {
            lines.extend(
                element
                    .child_elements()
                    .filter(|child| child.local_name() == "InvoiceLine"),
            );
        }
    }
    lines
}

fn line(line: &Element) -> LineView {
    let quantity = line.child("InvoicedQuantity");
    LineView {
        id: text_at(line, &["ID"]),
        name: text_at(line, &["Item", "Name"]),
        description: text_at(line, &["Item", "Description"]),
        quantity: quantity.map(trimmed).unwrap_or_default(),
        unit_code: quantity
            .and_then(|q| q.attribute("unitCode"))
            .unwrap_or_default()
            .to_string(),
        price: amount_at(line, &["Price", "PriceAmount"]),
        line_total: amount_at(line, &["LineExtensionAmount"]),
    }
}

fn signature(root: &Element) -> Option<SignatureView> {
    let scope = NamespaceScope::new().enter(root);
    let signature = root
        .child_elements()
        .filter(|element| {
            element.local_name() == "Signature"
                && scope.namespace_of(element).as_deref() == Some(DS_NS)
        })
        .last()?;
    Some(SignatureView {
        canonicalization: signature
            .find_path(&["SignedInfo", "CanonicalizationMethod"])
            .and_then(|method| method.attribute("Algorithm"))
            .unwrap_or_default()
            .to_string(),
        digest_value: text_at(signature, &["SignedInfo", "Reference", "DigestValue"]),
        signature_value: text_at(signature, &["SignatureValue"]),
        has_certificate: signature
            .find_path(&["KeyInfo", "X509Data", "X509Certificate"])
            .is_some(),
    })
}

fn trimmed(element: &Element) -> String {
    element.text().trim().to_string()
}

fn text_at(element: &Element, path: &[&str]) -> String {
    element.find_path(path).map(trimmed).unwrap_or_default()
}

fn first_text(element: &Element, paths: &[&[&str]]) -> String {
    paths
        .iter()
        .filter_map(|path| element.find_path(path))
        .map(trimmed)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn amount_at(element: &Element, path: &[&str]) -> Amount {
    element
        .find_path(path)
        .map(|amount| Amount {
            value: trimmed(amount),
            currency: amount.attribute("currencyID").unwrap_or_default().to_string(),
        })
        .unwrap_or_default()
}

/// Bytes escaped when an IRN is placed in a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode `irn` for use as one path segment of an invoice URL.
pub fn encode_path_segment(irn: &str) -> String {
    utf8_percent_encode(irn, PATH_SEGMENT).to_string()
}

/// Render the human-facing invoice page for the invoice stored under `irn`.
///
/// The title and PDF link use the store key rather than the document's
/// `cbc:ID`, which a template may omit or rewrite.
pub fn render_html(model: &DisplayModel, irn: &str) -> String {
    let mut html = String::new();
    let pdf_href = format!("/invoice/pdf/{}", encode_path_segment(irn));
    let irn = escape(irn);
    // writing to a String cannot fail
    let _ = write!(
        html,
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8">
  <title>Invoice {irn}</title>
  <style>
    body{{font-family:Arial;padding:20px;line-height:1.5}}
    h2{{border-bottom:1px solid #ccc}}
    table{{width:100%;border-collapse:collapse;margin-top:8px}}
    th,td{{border:1px solid #ccc;padding:6px;text-align:left}}
    th{{background:#f4f4f4}}
    .download{{display:inline-block;margin-top:20px;padding:8px 14px;border:1px solid #888}}
  </style>
</head>
<body>
  <h1>Invoice #{irn}</h1>
  <p><b>Issue date:</b> {issue_date}</p>
"#,
        issue_date = escape(model.issue_date.as_str()),
    );
    write_party(&mut html, "Supplier", &model.supplier);
    write_party(&mut html, "Customer", &model.customer);

    html.push_str(
        "  <h2>Items</h2>\n  <table>\n    <thead><tr><th>#</th><th>Name</th><th>Description</th><th>Qty</th><th>Price</th><th>Total</th></tr></thead>\n    <tbody>\n",
    );
    for line in &model.lines {
        let _ = writeln!(
            html,
            "      <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(line.id.as_str()),
            escape(line.name.as_str()),
            escape(line.description.as_str()),
            escape(format!("{} {}", line.quantity, line.unit_code).trim()),
            escape(line.price.to_string().as_str()),
            escape(line.line_total.to_string().as_str()),
        );
    }
    html.push_str("    </tbody>\n  </table>\n\n  <h2>Totals</h2>\n");
    for (label, amount) in [
        ("Line extension", &model.totals.line_extension),
        ("Tax exclusive", &model.totals.tax_exclusive),
        ("Tax inclusive", &model.totals.tax_inclusive),
        ("Payable", &model.totals.payable),
    ] {
        if !amount.value.is_empty() {
            let _ = writeln!(html, "  <p><b>{label}:</b> {}</p>", escape(amount.to_string().as_str()));
        }
    }
    if let Some(signature) = &model.signature {
        let _ = writeln!(
            html,
            "  <p><small>Signed, digest {}</small></p>",
            escape(signature.digest_value.as_str())
        );
    }
    let _ = write!(
        html,
        "\n  <a class=\"download\" href=\"{}\">Download PDF</a>\n</body>\n</html>\n",
        escape(pdf_href.as_str())
    );
    html
}

fn write_party(html: &mut String, heading: &str, party: &PartyView) {
    let _ = write!(
        html,
        "  <h2>{heading}</h2>\n  <p><b>Name:</b> {}</p>\n  <p><b>TIN:</b> {}</p>\n",
        escape(party.name.as_str()),
        escape(party.tax_id.as_str()),
    );
    if !party.email.is_empty() {
        let _ = writeln!(html, "  <p><b>Email:</b> {}</p>", escape(party.email.as_str()));
    }
    let address = [&party.street, &party.city, &party.postal_zone, &party.country]
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if !address.is_empty() {
        let _ = writeln!(html, "  <p><b>Address:</b> {}</p>", escape(address.as_str()));
    }
}
