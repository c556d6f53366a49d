//! Structured event records and the append-only log.

pub mod log;

pub use log::{read_records, EventLog, EventLogError, WallSource};

use crate::domain::{
    Fill, Instrument, OrderId, OrderSide, OrderState, OrderType, StrategyId, TimeInForce,
};
use crate::ledger::{CashMovementKind, ViolationKind};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every state-changing event the engine records. Tagged union; the tag is
/// the `kind` field of the serialized frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        seed: u64,
        capital: Decimal,
    },
    OrderSubmitted {
        order_id: OrderId,
        strategy: StrategyId,
        instrument: Instrument,
        side: OrderSide,
        size: Decimal,
        order_type: OrderType,
        tif: TimeInForce,
    },
    OrderStateChanged {
        order_id: OrderId,
        from: OrderState,
        to: OrderState,
        reason: Option<String>,
    },
    OrderFilled {
        fill: Fill,
    },
    CashMovement {
        movement: CashMovementKind,
        amount: Decimal,
        settled: bool,
        effective: Option<NaiveDate>,
    },
    PositionUpdated {
        instrument: Instrument,
        quantity: Decimal,
        avg_entry: Decimal,
        realized_pnl: Decimal,
    },
    RiskVeto {
        strategy: StrategyId,
        detail: String,
    },
    AccountViolation {
        violation: ViolationKind,
        instrument: Instrument,
        detail: String,
    },
    StrategyFault {
        strategy: StrategyId,
        detail: String,
    },
    RunCompleted {
        ticks: u64,
    },
}

/// One log record. Sequence numbers are strictly monotone; clock timestamps
/// are non-decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub clock_ts: DateTime<Utc>,
    pub wall_ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EventKind,
}
