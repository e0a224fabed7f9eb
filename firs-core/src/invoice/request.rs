//! Client-supplied invoice data in an explicit tagged form.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading an [`InvoiceRequest`].
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invoice request must be a JSON object")]
    NotAnObject,
    #[error("invoice request has no irn")]
    MissingIrn,
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: &'static str },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// The structured groups the renderer knows how to substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    AccountingSupplierParty,
    AccountingCustomerParty,
    LegalMonetaryTotal,
}

impl Section {
    pub const ALL: [Section; 3] = [
        Section::AccountingSupplierParty,
        Section::AccountingCustomerParty,
        Section::LegalMonetaryTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::AccountingSupplierParty => "accounting_supplier_party",
            Section::AccountingCustomerParty => "accounting_customer_party",
            Section::LegalMonetaryTotal => "legal_monetary_total",
        }
    }
}

impl FromStr for Section {
    type Err = ();

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Section::ALL
            .into_iter()
            .find(|section| section.as_str() == name)
            .ok_or(())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record of scalar fields plus one level of nested scalar groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub scalars: BTreeMap<String, String>,
    pub subgroups: BTreeMap<String, BTreeMap<String, String>>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.scalars.insert(field.into(), value.into());
        self
    }

    pub fn with_subgroup<K, V>(
        mut self,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.subgroups.insert(
            name.into(),
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Look up `field` or `subgroup.field`.
    pub fn get(&self, path: &str) -> Option<&str> {
        match path.split_once('.') {
            None => self.scalars.get(path).map(String::as_str),
            Some((group, field)) => self
                .subgroups
                .get(group)
                .and_then(|fields| fields.get(field))
                .map(String::as_str),
        }
    }

    fn from_object(fields: Map<String, Value>, context: &str) -> Self {
        let mut group = Group::default();
        for (name, value) in fields {
            match value {
                Value::Object(inner) => {
                    let mut nested = BTreeMap::new();
                    for (field, value) in inner {
                        match scalar_text(&value) {
                            Some(text) => {
                                nested.insert(field, text);
                            }
                            None => debug!(context, group = %name, field = %field, "ignoring non-scalar nested value"),
                        }
                    }
                    group.subgroups.insert(name, nested);
                }
                other => match scalar_text(&other) {
                    Some(text) => {
                        group.scalars.insert(name, text);
                    }
                    None => debug!(context, field = %name, "ignoring non-scalar value"),
                },
            }
        }
        group
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.scalars {
            map.insert(name.clone(), Value::String(value.clone()));
        }
        for (name, fields) in &self.subgroups {
            let inner = fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            map.insert(name.clone(), Value::Object(inner));
        }
        Value::Object(map)
    }
}

/// Invoice data as sent to `POST /simulate-firs`.
///
/// # Examples
/// ```rust
/// use firs_core::invoice::request::{InvoiceRequest, Section};
///
/// let request = InvoiceRequest::from_json(
///     r#"{"irn":"INV001","accounting_supplier_party":{"party_name":"Acme"}}"#,
/// )?;
/// assert_eq!(request.irn(), "INV001");
/// assert_eq!(
///     request.section(Section::AccountingSupplierParty).and_then(|g| g.get("party_name")),
///     Some("Acme")
/// );
/// # Ok::<(), firs_core::invoice::request::RequestError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct InvoiceRequest {
    irn: String,
    scalars: BTreeMap<String, String>,
    sections: BTreeMap<Section, Group>,
    invoice_line: Vec<Group>,
}

impl InvoiceRequest {
    pub fn new(irn: impl Into<String>) -> Self {
        let irn = irn.into();
        let mut scalars = BTreeMap::new();
        scalars.insert("irn".to_string(), irn.clone());
        Self {
            irn,
            scalars,
            sections: BTreeMap::new(),
            invoice_line: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, RequestError> {
        let value: Value = serde_json::from_str(json)?;
        InvoiceRequest::try_from(value)
    }

    pub fn with_scalar(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        let field = field.into();
        let value = value.into();
        if field == "irn" {
            self.irn = value.clone();
        }
        self.scalars.insert(field, value);
        self
    }

    pub fn with_section(mut self, section: Section, group: Group) -> Self {
        self.sections.insert(section, group);
        self
    }

    pub fn with_line(mut self, line: Group) -> Self {
        self.invoice_line.push(line);
        self
    }

    pub fn irn(&self) -> &str {
        &self.irn
    }

    /// Top-level scalar field, `irn` included.
    pub fn scalar(&self, field: &str) -> Option<&str> {
        self.scalars.get(field).map(String::as_str)
    }

    pub fn scalars(&self) -> &BTreeMap<String, String> {
        &self.scalars
    }

    pub fn section(&self, section: Section) -> Option<&Group> {
        self.sections.get(&section)
    }

    pub fn sections(&self) -> &BTreeMap<Section, Group> {
        &self.sections
    }

    pub fn lines(&self) -> &[Group] {
        &self.invoice_line
    }
}

impl TryFrom<Value> for InvoiceRequest {
    type Error = RequestError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(fields) = value else {
            return Err(RequestError::NotAnObject);
        };

        let mut scalars = BTreeMap::new();
        let mut sections = BTreeMap::new();
        let mut invoice_line = Vec::new();

        for (name, value) in fields {
            if name == "invoice_line" {
                match value {
                    Value::Array(entries) => {
                        for (index, entry) in entries.into_iter().enumerate() {
                            let Value::Object(entry) = entry else {
                                return Err(RequestError::InvalidField {
                                    field: format!("invoice_line[{index}]"),
                                    reason: "expected an object",
                                });
                            };
                            invoice_line.push(Group::from_object(entry, "invoice_line"));
                        }
                    }
                    Value::Null => {}
                    _ => {
                        return Err(RequestError::InvalidField {
                            field: name,
                            reason: "expected an array",
                        });
                    }
                }
                continue;
            }

            match value {
                Value::Object(group) => match name.parse::<Section>() {
                    Ok(section) => {
                        sections.insert(section, Group::from_object(group, section.as_str()));
                    }
                    Err(()) => debug!(field = %name, "ignoring unknown group"),
                },
                Value::Array(_) => debug!(field = %name, "ignoring array field"),
                other => {
                    if let Some(text) = scalar_text(&other) {
                        scalars.insert(name, text);
                    }
                }
            }
        }

        let irn = scalars
            .get("irn")
            .filter(|irn| !irn.trim().is_empty())
            .cloned()
            .ok_or(RequestError::MissingIrn)?;

        Ok(Self {
            irn,
            scalars,
            sections,
            invoice_line,
        })
    }
}

impl From<InvoiceRequest> for Value {
    fn from(request: InvoiceRequest) -> Self {
        let mut map = Map::new();
        for (name, value) in request.scalars {
            map.insert(name, Value::String(value));
        }
        for (section, group) in &request.sections {
            map.insert(section.as_str().to_string(), group.to_value());
        }
        if !request.invoice_line.is_empty() {
            let lines = request.invoice_line.iter().map(Group::to_value).collect();
            map.insert("invoice_line".to_string(), Value::Array(lines));
        }
        Value::Object(map)
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number_text(number)),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Integral floats print without a fraction (`500.0` as `500`), the way
/// JSON numbers read back as text in the clients that post requests.
fn number_text(number: &Number) -> String {
    match number.as_f64() {
        // -0.0 prints as "0"
        Some(value) if value == 0.0 => "0".to_string(),
        Some(value) if number.is_f64() && value.fract() == 0.0 && value.abs() < 1e21 => {
            format!("{value:.0}")
        }
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_sections_lines_and_scalars() {
        let request = InvoiceRequest::try_from(json!({
            "irn": 42,
            "issue_date": "2024-05-01",
            "paid": true,
            "accounting_supplier_party": {
                "party_name": "Acme",
                "postal_address": {"city_name": "Lagos", "deep": {"x": 1}}
            },
            "extras": {"ignored": "yes"},
            "tags": ["a"],
            "note": null,
            "invoice_line": [
                {"item_name": "Widget", "price": 500.0},
                {"item_name": "Gadget"}
            ]
        }))
        .expect("request");

        assert_eq!(request.irn(), "42");
        assert_eq!(request.scalar("irn"), Some("42"));
        assert_eq!(request.scalar("paid"), Some("true"));
        assert_eq!(request.scalar("note"), None);
        assert_eq!(request.scalar("tags"), None);
        let supplier = request
            .section(Section::AccountingSupplierParty)
            .expect("supplier");
        assert_eq!(supplier.get("party_name"), Some("Acme"));
        assert_eq!(supplier.get("postal_address.city_name"), Some("Lagos"));
        assert_eq!(supplier.get("postal_address.deep"), None);
        assert_eq!(request.sections().len(), 1);
        assert_eq!(request.lines().len(), 2);
        assert_eq!(request.lines()[0].get("price"), Some("500"));
        assert_eq!(request.lines()[1].get("item_name"), Some("Gadget"));
    }

    #[test]
    fn rejects_missing_irn_and_bad_lines() {
        assert!(matches!(
            InvoiceRequest::try_from(json!({"note": "x"})),
            Err(RequestError::MissingIrn)
        ));
        assert!(matches!(
            InvoiceRequest::try_from(json!({"irn": "  "})),
            Err(RequestError::MissingIrn)
        ));
        assert!(matches!(
            InvoiceRequest::try_from(json!([1, 2])),
            Err(RequestError::NotAnObject)
        ));
        assert!(matches!(
            InvoiceRequest::try_from(json!({"irn": "A", "invoice_line": {"item_name": "x"}})),
            Err(RequestError::InvalidField { .. })
        ));
        let err = InvoiceRequest::try_from(json!({"irn": "A", "invoice_line": [{}, 3]}))
            .expect_err("non-object line");
        assert_eq!(err.to_string(), "invalid field invoice_line[1]: expected an object");
        assert!(matches!(
            InvoiceRequest::from_json("{not json"),
            Err(RequestError::Json(_))
        ));
    }

    #[test]
    fn serde_uses_the_json_shape() {
        let request = InvoiceRequest::new("INV001")
            .with_section(
                Section::LegalMonetaryTotal,
                Group::new().with("payable_amount", "1000.00"),
            )
            .with_line(
                Group::new()
                    .with("item_name", "Widget")
                    .with_subgroup("line_extension_amount", [("amount", "1000.00")]),
            );
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            json!({
                "irn": "INV001",
                "legal_monetary_total": {"payable_amount": "1000.00"},
                "invoice_line": [
                    {"item_name": "Widget", "line_extension_amount": {"amount": "1000.00"}}
                ]
            })
        );
        let back: InvoiceRequest = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, request);
    }

    #[test]
    fn numbers_print_like_json_clients() {
        let request = InvoiceRequest::try_from(json!({
            "irn": "INV001",
            "invoice_line": [{
                "price": 500.0,
                "quantity": 7,
                "rate": 12.5,
                "discount": -0.0,
                "refund": -3.0,
                "big": 1e20
            }]
        }))
        .expect("request");
        let line = &request.lines()[0];
        assert_eq!(line.get("price"), Some("500"));
        assert_eq!(line.get("quantity"), Some("7"));
        assert_eq!(line.get("rate"), Some("12.5"));
        assert_eq!(line.get("discount"), Some("0"));
        assert_eq!(line.get("refund"), Some("-3"));
        assert_eq!(line.get("big"), Some("100000000000000000000"));
    }
}
