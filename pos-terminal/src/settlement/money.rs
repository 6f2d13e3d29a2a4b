//! Monetary arithmetic for settlement totals
//!
//! All calculations run through `Decimal` and are rounded to two places
//! half-up before converting back to `f64` for the invoice record. Totals
//! are always computed from the live cart at settlement time, never
//! cached.

use rust_decimal::prelude::*;
use shared::cart::CartLine;

/// VAT applied to every sale (10% of subtotal)
const VAT_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 1);

/// Rounding for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Totals derived from a cart
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartTotals {
    pub subtotal: f64,
    pub vat: f64,
    pub total: f64,
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

fn round(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

/// Sum of `unit_price × quantity` over the cart
pub fn cart_subtotal(lines: &[CartLine]) -> f64 {
    round(subtotal_decimal(lines))
}

fn subtotal_decimal(lines: &[CartLine]) -> Decimal {
    lines.iter().fold(Decimal::ZERO, |acc, line| {
        acc + to_decimal(line.unit_price) * Decimal::from(line.quantity)
    })
}

/// Subtotal, VAT, and VAT-inclusive total for a cart
pub fn compute_totals(lines: &[CartLine]) -> CartTotals {
    let subtotal = subtotal_decimal(lines);
    let vat = subtotal * VAT_RATE;
    CartTotals {
        subtotal: round(subtotal),
        vat: round(vat),
        total: round(subtotal + vat),
    }
}

/// Amount due after discount: subtotal + VAT − discount
pub fn final_amount(totals: &CartTotals, discount: f64) -> f64 {
    round(to_decimal(totals.subtotal) + to_decimal(totals.vat) - to_decimal(discount))
}

/// Whether a tendered amount covers what is due, within tolerance
pub fn covers(paid: f64, due: f64) -> bool {
    to_decimal(paid) + MONEY_TOLERANCE >= to_decimal(due)
}

/// Change owed to the customer, never negative
pub fn change_due(paid: f64, due: f64) -> f64 {
    let change = to_decimal(paid) - to_decimal(due);
    if change < Decimal::ZERO {
        0.0
    } else {
        round(change)
    }
}
