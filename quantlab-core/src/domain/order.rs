//! Order specifications and the order lifecycle state machine.

use crate::domain::ids::{FillId, OrderId, StrategyId};
use crate::domain::instrument::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells; the sign of the position delta.
    pub fn sign(&self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => -Decimal::ONE,
        }
    }

    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { limit: Decimal },
    Stop { stop: Decimal },
    StopLimit { stop: Decimal, limit: Decimal },
}

impl OrderType {
    pub fn limit_price(&self) -> Option<Decimal> {
        match self {
            OrderType::Limit { limit } | OrderType::StopLimit { limit, .. } => Some(*limit),
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        match self {
            OrderType::Stop { stop } | OrderType::StopLimit { stop, .. } => Some(*stop),
            _ => None,
        }
    }

    pub fn requires_trigger(&self) -> bool {
        matches!(self, OrderType::Stop { .. } | OrderType::StopLimit { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancelled.
    Gtc,
    /// Immediate or cancel: unfilled remainder cancels after the first match attempt.
    Ioc,
    /// Fill or kill: cancels unless the first match attempt fills in full.
    Fok,
    /// Expires at session close.
    Day,
    /// Market on open.
    Moo,
    /// Market on close.
    Moc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkKind {
    Bracket,
    Oco,
}

/// Role of a spec within a linked group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupRole {
    /// Bracket parent; fills activate the children.
    Entry,
    TakeProfit,
    StopLoss,
    /// Plain OCO member.
    Member,
}

/// Linkage declaration on a spec. `group` is local to the submitted batch;
/// the order manager resolves it into parent/child and sibling references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub group: u32,
    pub kind: LinkKind,
    pub role: GroupRole,
}

/// What the execution stage asks for. Identity-free; the order manager
/// assigns ids and owns all subsequent mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub instrument: Instrument,
    pub side: OrderSide,
    /// Absolute size in units; must be positive.
    pub size: Decimal,
    pub order_type: OrderType,
    pub tif: TimeInForce,
    pub link: Option<GroupSpec>,
}

impl OrderSpec {
    pub fn market(instrument: Instrument, side: OrderSide, size: Decimal) -> Self {
        Self {
            instrument,
            side,
            size,
            order_type: OrderType::Market,
            tif: TimeInForce::Gtc,
            link: None,
        }
    }

    pub fn limit(instrument: Instrument, side: OrderSide, size: Decimal, limit: Decimal) -> Self {
        Self {
            instrument,
            side,
            size,
            order_type: OrderType::Limit { limit },
            tif: TimeInForce::Gtc,
            link: None,
        }
    }

    pub fn stop(instrument: Instrument, side: OrderSide, size: Decimal, stop: Decimal) -> Self {
        Self {
            instrument,
            side,
            size,
            order_type: OrderType::Stop { stop },
            tif: TimeInForce::Gtc,
            link: None,
        }
    }

    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    pub fn with_link(mut self, link: GroupSpec) -> Self {
        self.link = Some(link);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Not yet active (bracket child awaiting parent fill).
    Pending,
    /// Sent, in transit to the venue.
    Submitted,
    /// Acknowledged by the venue.
    Accepted,
    /// Eligible for matching.
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Structurally invalid spec.
    Validation(String),
    InsufficientBuyingPower,
    RiskVeto,
    Venue(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Validation(msg) => write!(f, "validation: {msg}"),
            RejectReason::InsufficientBuyingPower => write!(f, "insufficient buying power"),
            RejectReason::RiskVeto => write!(f, "risk veto"),
            RejectReason::Venue(msg) => write!(f, "venue: {msg}"),
        }
    }
}

/// An order with full lifecycle tracking. Created by the order manager from
/// an [`OrderSpec`]; mutated only by the order manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub strategy: StrategyId,
    pub spec: OrderSpec,
    pub state: OrderState,
    pub filled_qty: Decimal,
    pub cancelled_qty: Decimal,
    /// Sum of price * size across fills. Kept exactly so the average price
    /// is the true size-weighted mean, not an incrementally rounded one.
    pub filled_notional: Decimal,
    /// Size-weighted average price across fills; zero until the first fill.
    pub avg_fill_price: Decimal,
    pub commission: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Matching is gated until the clock reaches this moment (latency).
    pub eligible_at: DateTime<Utc>,
    /// Reference price at acceptance, for slippage attribution.
    pub arrival_price: Option<Decimal>,
    /// Stop has been touched; the order now acts as market/limit.
    pub triggered: bool,
    pub parent: Option<OrderId>,
    pub children: Vec<OrderId>,
    pub oco_siblings: Vec<OrderId>,
    pub fills: Vec<FillId>,
    pub reject_reason: Option<RejectReason>,
}

impl Order {
    pub fn new(id: OrderId, strategy: StrategyId, spec: OrderSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            strategy,
            spec,
            state: OrderState::Pending,
            filled_qty: Decimal::ZERO,
            cancelled_qty: Decimal::ZERO,
            filled_notional: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            eligible_at: now,
            arrival_price: None,
            triggered: false,
            parent: None,
            children: Vec::new(),
            oco_siblings: Vec::new(),
            fills: Vec::new(),
            reject_reason: None,
        }
    }

    pub fn remaining_qty(&self) -> Decimal {
        self.spec.size - self.filled_qty - self.cancelled_qty
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }

    /// Eligible for fill matching (subject to the latency gate).
    pub fn is_working(&self) -> bool {
        matches!(self.state, OrderState::Working | OrderState::PartiallyFilled)
    }

    /// Record a fill against this order. Panics if the fill exceeds the
    /// remaining quantity; the manager checks proposals before applying.
    pub fn record_fill(
        &mut self,
        fill_id: FillId,
        price: Decimal,
        qty: Decimal,
        commission: Decimal,
        now: DateTime<Utc>,
    ) {
        assert!(
            qty <= self.remaining_qty(),
            "fill {qty} exceeds remaining {}",
            self.remaining_qty()
        );
        self.filled_notional += price * qty;
        self.filled_qty += qty;
        self.avg_fill_price = self.filled_notional / self.filled_qty;
        self.commission += commission;
        self.fills.push(fill_id);
        self.updated_at = now;
        self.state = if self.remaining_qty() == Decimal::ZERO {
            OrderState::Filled
        } else {
            OrderState::PartiallyFilled
        };
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        if !self.is_terminal() {
            self.cancelled_qty = self.spec.size - self.filled_qty;
            self.state = OrderState::Cancelled;
            self.updated_at = now;
        }
    }

    pub fn reject(&mut self, reason: RejectReason, now: DateTime<Utc>) {
        self.cancelled_qty = self.spec.size - self.filled_qty;
        self.state = OrderState::Rejected;
        self.reject_reason = Some(reason);
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
    }

    fn test_order(size: Decimal) -> Order {
        Order::new(
            OrderId(1),
            StrategyId::new("test"),
            OrderSpec::market(Instrument::equity("SPY"), OrderSide::Buy, size),
            now(),
        )
    }

    #[test]
    fn fill_accumulates_weighted_average() {
        let mut order = test_order(dec!(100));
        order.record_fill(FillId(1), dec!(10.00), dec!(60), dec!(0.30), now());
        assert_eq!(order.state, OrderState::PartiallyFilled);
        order.record_fill(FillId(2), dec!(10.10), dec!(40), dec!(0.20), now());
        assert_eq!(order.state, OrderState::Filled);
        assert_eq!(order.filled_qty, dec!(100));
        // (10.00*60 + 10.10*40) / 100 = 10.04
        assert_eq!(order.avg_fill_price, dec!(10.04));
        assert_eq!(order.commission, dec!(0.50));
    }

    #[test]
    fn terminal_quantities_reconcile() {
        let mut order = test_order(dec!(100));
        order.record_fill(FillId(1), dec!(10), dec!(30), Decimal::ZERO, now());
        order.cancel(now());
        assert_eq!(order.state, OrderState::Cancelled);
        assert_eq!(
            order.filled_qty + order.cancelled_qty + order.remaining_qty(),
            order.spec.size
        );
        assert_eq!(order.remaining_qty(), Decimal::ZERO);
    }

    #[test]
    #[should_panic(expected = "exceeds remaining")]
    fn overfill_panics() {
        let mut order = test_order(dec!(50));
        order.record_fill(FillId(1), dec!(10), dec!(60), Decimal::ZERO, now());
    }

    #[test]
    fn cancel_after_terminal_is_noop() {
        let mut order = test_order(dec!(10));
        order.record_fill(FillId(1), dec!(10), dec!(10), Decimal::ZERO, now());
        assert_eq!(order.state, OrderState::Filled);
        order.cancel(now());
        assert_eq!(order.state, OrderState::Filled);
    }
}
