//! Domain models

pub mod dining_table;
pub mod invoice;
pub mod product;

pub use dining_table::{DiningTable, TableStatus};
pub use invoice::{Invoice, InvoiceLine, InvoiceStatus};
pub use product::Product;
