//! Process-lifetime invoice store keyed by IRN.
use crate::invoice::InvoiceRequest;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invoice {irn} not found")]
    NotFound { irn: String },
}

/// A signed invoice as kept by the store. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInvoice {
    pub irn: String,
    pub signed_xml: String,
    pub request: InvoiceRequest,
    pub created_at: DateTime<Utc>,
}

/// Map from IRN to the latest signed invoice.
///
/// Entries are shared as `Arc<StoredInvoice>`, so a reader holds either the
/// old or the new entry of a concurrent overwrite, never a mix of both.
/// A later `put` for the same IRN replaces the earlier one.
#[derive(Debug, Default)]
pub struct InvoiceStore {
    invoices: RwLock<HashMap<String, Arc<StoredInvoice>>>,
}

impl InvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(
        &self,
        irn: impl Into<String>,
        signed_xml: String,
        request: InvoiceRequest,
    ) -> Arc<StoredInvoice> {
        let irn = irn.into();
        let stored = Arc::new(StoredInvoice {
            irn: irn.clone(),
            signed_xml,
            request,
            created_at: Utc::now(),
        });
        let previous = self.invoices.write().insert(irn.clone(), Arc::clone(&stored));
        if previous.is_some() {
            warn!(irn = %irn, "overwriting stored invoice with the same irn");
        } else {
            debug!(irn = %irn, "stored invoice");
        }
        stored
    }

    pub fn get(&self, irn: &str) -> Result<Arc<StoredInvoice>, StoreError> {
        self.invoices
            .read()
            .get(irn)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                irn: irn.to_string(),
            })
    }

    pub fn contains(&self, irn: &str) -> bool {
        self.invoices.read().contains_key(irn)
    }

    pub fn len(&self) -> usize {
        self.invoices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.read().is_empty()
    }
}
