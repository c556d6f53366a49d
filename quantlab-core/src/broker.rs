//! Broker boundary.
//!
//! Live adapters satisfy this protocol in place of the simulated fill and
//! cost engines, which together form the backtest implementation of the
//! same boundary. The core ships no live adapter; the trait exists so
//! engine callers can swap one in without touching strategy code.

use crate::domain::{Instrument, OrderId, OrderSpec, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("order {0} not found")]
    UnknownOrder(OrderId),

    #[error("broker rejected order: {0}")]
    Rejected(String),

    #[error("broker connection lost: {0}")]
    Disconnected(String),
}

/// Point-in-time account state as the broker reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub currency: String,
    pub settled_cash: Decimal,
    pub unsettled_cash: Decimal,
    pub reserved_cash: Decimal,
    pub buying_power: Decimal,
    pub net_liquidation: Decimal,
}

/// Handle returned on submission, for later cancel/modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle(pub OrderId);

/// Order routing and account queries against a live venue.
pub trait Broker: Send {
    fn submit(&mut self, spec: OrderSpec) -> Result<OrderHandle, BrokerError>;

    fn cancel(&mut self, id: OrderId) -> Result<(), BrokerError>;

    /// Price and/or size amendment. Venue semantics decide whether queue
    /// priority survives.
    fn modify(
        &mut self,
        id: OrderId,
        new_price: Option<Decimal>,
        new_size: Option<Decimal>,
    ) -> Result<(), BrokerError>;

    fn positions(&self) -> Vec<Position>;

    fn position(&self, instrument: &Instrument) -> Option<Position> {
        self.positions()
            .into_iter()
            .find(|p| &p.instrument == instrument)
    }

    fn account(&self) -> Result<AccountSnapshot, BrokerError>;
}
