//! Product Model

use serde::{Deserialize, Serialize};

/// Catalog product entity.
///
/// Reference data: the engine only reads products; the admin screens own
/// all product writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub unit_price: f64,
    #[serde(default)]
    pub image: Option<String>,
}
