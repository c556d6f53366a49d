//! Fill — a completed (full or partial) order execution.

use crate::domain::ids::{FillId, OrderId};
use crate::domain::instrument::Instrument;
use crate::domain::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Top-of-book state at a moment in time. All orders evaluated within one
/// tick see the same snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
}

impl MarketSnapshot {
    pub fn mid(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
            _ => None,
        }
    }

    /// Reference price for slippage attribution: mid, falling back to last.
    pub fn arrival_price(&self) -> Option<Decimal> {
        self.mid().or(self.last)
    }

    pub fn spread(&self) -> Option<Decimal> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }
}

/// Record of an order execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub instrument: Instrument,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub commission: Decimal,
    /// Signed execution shortfall vs. the order's arrival price (positive = cost).
    pub slippage: Decimal,
    pub snapshot: MarketSnapshot,
}

impl Fill {
    /// Cash delta this fill produces: negative for buys, positive for sells,
    /// net of commission either way.
    pub fn cash_delta(&self) -> Decimal {
        -self.side.sign() * self.price * self.size - self.commission
    }
}
