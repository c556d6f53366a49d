//! Position — a signed holding in a single instrument.

use crate::domain::instrument::Instrument;
use crate::domain::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A signed position. Positive quantity is long, negative short. Created on
/// first fill and retained after flattening for historical trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    pub quantity: Decimal,
    /// Volume-weighted average entry price of the open quantity.
    pub avg_entry: Decimal,
    /// Accumulated P&L from closed portions.
    pub realized_pnl: Decimal,
    pub last_mark: Option<Decimal>,
    pub marked_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            quantity: Decimal::ZERO,
            avg_entry: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_mark: None,
            marked_at: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == Decimal::ZERO
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// Apply a fill and return the realized P&L delta it produced.
    ///
    /// Increases (same direction) recompute the running weighted-average
    /// entry. Reductions realize `(price - avg_entry) * closed_qty * sign`.
    /// A fill through zero closes the old side first, then opens the new
    /// side at the fill price.
    pub fn apply_fill(&mut self, side: OrderSide, price: Decimal, qty: Decimal) -> Decimal {
        let delta = side.sign() * qty;
        let old_qty = self.quantity;
        let new_qty = old_qty + delta;

        let mut realized = Decimal::ZERO;

        if old_qty == Decimal::ZERO || old_qty.signum() == delta.signum() {
            // Open or increase: weighted-average entry.
            let notional = self.avg_entry * old_qty.abs() + price * qty;
            self.avg_entry = notional / new_qty.abs();
        } else if new_qty.signum() == old_qty.signum() || new_qty == Decimal::ZERO {
            // Partial or full reduction.
            let closed = qty.min(old_qty.abs());
            realized = (price - self.avg_entry) * closed * old_qty.signum();
            if new_qty == Decimal::ZERO {
                self.avg_entry = Decimal::ZERO;
            }
        } else {
            // Reversal: close the entire old side, open the remainder.
            let closed = old_qty.abs();
            realized = (price - self.avg_entry) * closed * old_qty.signum();
            self.avg_entry = price;
        }

        self.quantity = new_qty;
        self.realized_pnl += realized;
        realized
    }

    pub fn mark(&mut self, price: Decimal, at: DateTime<Utc>) {
        self.last_mark = Some(price);
        self.marked_at = Some(at);
    }

    /// Unrealized P&L at the given price.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.avg_entry) * self.quantity
    }

    /// Signed market value at the given price.
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }
}
