//! Dining Table Model

use serde::{Deserialize, Serialize};

/// Seating status of a dining table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Available,
    Occupied,
}

/// Dining table entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiningTable {
    pub id: String,
    pub name: String,
    pub capacity: i32,
    pub status: TableStatus,
    /// The walk-in/takeaway pseudo-table; exempt from status transitions.
    #[serde(default)]
    pub is_takeaway: bool,
}
