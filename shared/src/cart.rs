//! Cart line types shared between the order store and settlement

use serde::{Deserialize, Serialize};

/// One product line inside a table's active order.
///
/// Name and unit price are snapshots taken when the line is first added;
/// later catalog edits do not retroactively change an open cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub name: String,
    pub unit_price: f64,
    pub quantity: i32,
}

impl CartLine {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        unit_price: f64,
        quantity: i32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }
}
