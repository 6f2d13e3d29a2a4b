//! Shared domain types for the POS terminal engine
//!
//! Models exchanged between the order-capture engine and the terminal UI:
//! catalog reference data (products, dining tables), cart lines, and the
//! immutable invoice records produced by settlement.

pub mod cart;
pub mod models;
pub mod util;

// Re-exports
pub use cart::CartLine;
pub use models::{
    DiningTable, Invoice, InvoiceLine, InvoiceStatus, Product, TableStatus,
};
