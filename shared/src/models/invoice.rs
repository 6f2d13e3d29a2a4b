//! Invoice Models
//!
//! An invoice is immutable once created. Its `invoice_id` is generated on
//! the terminal and doubles as the idempotency key for remote writes, so
//! replaying a settlement never produces a second sale.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an invoice.
///
/// The terminal engine only ever produces settled invoices; cancellation
/// and approval flows belong to the back-office screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Settled,
}

/// Finalized sale record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Client-generated, globally unique; idempotency key for remote writes
    pub invoice_id: String,
    pub table_id: String,
    /// Unix millis at settlement time
    pub issued_at: i64,
    pub employee: String,
    pub customer: String,
    pub subtotal: f64,
    pub vat: f64,
    pub discount: f64,
    pub amount_paid: f64,
    pub change: f64,
    #[serde(default)]
    pub note: String,
    pub status: InvoiceStatus,
}

/// One product line of an invoice.
///
/// Unit price is not duplicated here; it is derivable from the cart line
/// snapshot the invoice was settled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub line_id: String,
    pub invoice_id: String,
    pub product_id: String,
    pub quantity: i32,
}

impl InvoiceLine {
    pub fn new(invoice_id: &str, product_id: &str, quantity: i32) -> Self {
        Self {
            line_id: format!("{invoice_id}_{product_id}"),
            invoice_id: invoice_id.to_string(),
            product_id: product_id.to_string(),
            quantity,
        }
    }
}
