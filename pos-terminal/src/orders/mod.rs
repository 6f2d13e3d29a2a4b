//! Active order management
//!
//! The per-table cart working set of the terminal: exactly one table is
//! selected at a time, the visible cart always mirrors the selected
//! table's order, and every mutation is persisted synchronously before it
//! returns.

pub mod store;

pub use store::{ActiveOrderStore, OrderError};
