use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One line item recovered from the receipt body.
///
/// Duplicate names are valid — a receipt may list the same product twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    pub qty: u32,
    pub price: f64,
}

/// The structured record extracted from one blob of OCR text.
///
/// Every field other than `raw_text` is best-effort: absent means "not
/// recoverable from the text", never zero. The record is constructed once
/// by the parser and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub merchant: Option<String>,
    pub cashier: Option<String>,
    pub bill_no: Option<String>,
    /// Line order matches the source text.
    pub items: Vec<ReceiptItem>,
    pub subtotal: Option<f64>,
    pub total: Option<f64>,
    pub cash: Option<f64>,
    pub change: Option<f64>,
    /// Full OCR text, unmodified, retained for audit.
    pub raw_text: String,
    /// Open extension map for extraction keys the fixed schema doesn't
    /// anticipate.
    pub other_fields: BTreeMap<String, String>,
}

impl ParsedReceipt {
    /// A record with nothing extracted — the floor the parser degrades to.
    pub fn empty(raw_text: impl Into<String>) -> Self {
        Self {
            merchant: None,
            cashier: None,
            bill_no: None,
            items: Vec::new(),
            subtotal: None,
            total: None,
            cash: None,
            change: None,
            raw_text: raw_text.into(),
            other_fields: BTreeMap::new(),
        }
    }

    /// True when no field beyond `raw_text` was recovered.
    pub fn is_bare(&self) -> bool {
        self.merchant.is_none()
            && self.cashier.is_none()
            && self.bill_no.is_none()
            && self.items.is_empty()
            && self.subtotal.is_none()
            && self.total.is_none()
            && self.cash.is_none()
            && self.change.is_none()
            && self.other_fields.is_empty()
    }
}
