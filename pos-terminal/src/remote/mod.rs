//! Remote entity-store contract
//!
//! The system of record is a generic "table of rows" service supporting
//! Find/Add/Edit/Delete, consumed through the [`RemoteStore`] trait. The
//! engine never defines this service; it only depends on the narrow
//! request shape below. [`http::HttpRemoteStore`] is the production
//! implementation; tests substitute an in-process mock.
//!
//! The remote store is expected to tolerate duplicate `Add` writes under
//! the same invoice id (or to find double-delivery acceptable): retries
//! only stop once the terminal locally records success, so a lost
//! acknowledgment can legitimately resend an accepted row.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Entity names used by this engine
pub mod entities {
    pub const PRODUCTS: &str = "products";
    pub const DINING_TABLES: &str = "dining_tables";
    pub const INVOICES: &str = "invoices";
    pub const INVOICE_LINES: &str = "invoice_lines";
}

/// Row-store operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Find,
    Add,
    Edit,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Find => "Find",
            Operation::Add => "Add",
            Operation::Edit => "Edit",
            Operation::Delete => "Delete",
        }
    }
}

/// Payload of one row-store request
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestPayload {
    /// Filter selector for Find operations
    #[serde(rename = "Selector", skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Rows for Add/Edit/Delete operations
    #[serde(rename = "Rows", skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Value>,
}

impl RequestPayload {
    /// Selector matching every row of an entity
    pub fn find_all(entity: &str) -> Self {
        Self {
            selector: Some(format!("Filter({entity}, true)")),
            rows: Vec::new(),
        }
    }

    pub fn rows(rows: Vec<Value>) -> Self {
        Self {
            selector: None,
            rows,
        }
    }
}

/// Remote store errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("remote store rejected request: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// The typed request function through which all remote access flows
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn request(
        &self,
        entity: &str,
        operation: Operation,
        payload: RequestPayload,
    ) -> Result<Vec<Value>, RemoteError>;
}
