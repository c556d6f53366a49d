//! Fill models: pluggable policies deciding whether a working order fills at
//! the current tick, at what price and size.
//!
//! Rules every policy obeys: all orders within a tick see the same market
//! snapshot; proposals never exceed the order's remaining quantity; partial
//! fills advance `filled_qty` monotonically. The engine walks working orders
//! in submission order, so same-strategy fills at one tick preserve it.

pub mod book;
pub mod instant;
pub mod probabilistic;
pub mod spread;
pub mod tape;

pub use book::{OrderBookFill, QueuePosition};
pub use instant::InstantFill;
pub use probabilistic::ProbabilisticFill;
pub use spread::SpreadAwareFill;
pub use tape::TradeTapeFill;

use crate::domain::{MarketEvent, MarketSnapshot, Order, OrderSide, OrderType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What happens when a limit price exactly equals the opposite quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitTouchRule {
    /// Touch is enough: a buy limit at p fills when ask <= p.
    FillAtTouch,
    /// Strict cross required: ask < p.
    RequireCross,
}

/// Per-tick inputs shared by every order evaluated at that tick.
pub struct FillContext<'a> {
    pub now: DateTime<Utc>,
    pub snapshot: &'a MarketSnapshot,
    /// The event that advanced the clock to `now`, when it concerns the
    /// order's instrument. Tape and book models key off it.
    pub event: Option<&'a MarketEvent>,
}

/// A proposed execution. Price is pre-cost; the cost engine adjusts it.
#[derive(Debug, Clone, PartialEq)]
pub struct FillProposal {
    pub price: Decimal,
    pub size: Decimal,
}

/// A fill policy. `propose` may return several proposals (one per book level
/// touched); each must respect the remaining quantity in aggregate.
pub trait FillModel: Send {
    fn propose(&mut self, order: &Order, ctx: &FillContext) -> Vec<FillProposal>;
    fn name(&self) -> &'static str;
}

/// Whether the stop condition is touched by the current market. Reference
/// price is the last trade, falling back to mid.
pub fn stop_touched(order: &Order, snapshot: &MarketSnapshot) -> bool {
    let Some(stop) = order.spec.order_type.stop_price() else {
        return false;
    };
    let Some(reference) = snapshot.last.or_else(|| snapshot.mid()) else {
        return false;
    };
    match order.spec.side {
        OrderSide::Buy => reference >= stop,
        OrderSide::Sell => reference <= stop,
    }
}

/// Whether a stop-style order is currently allowed to act. Plain orders
/// always are; stops require the trigger to have been touched.
pub fn is_actionable(order: &Order) -> bool {
    !order.spec.order_type.requires_trigger() || order.triggered
}

/// Whether the opposite quote satisfies the limit under the configured touch
/// rule. Returns the executable quote price.
pub fn limit_satisfied(
    side: OrderSide,
    limit: Decimal,
    snapshot: &MarketSnapshot,
    rule: LimitTouchRule,
) -> Option<Decimal> {
    match side {
        OrderSide::Buy => {
            let ask = snapshot.ask.or(snapshot.last)?;
            let ok = match rule {
                LimitTouchRule::FillAtTouch => ask <= limit,
                LimitTouchRule::RequireCross => ask < limit,
            };
            ok.then_some(ask)
        }
        OrderSide::Sell => {
            let bid = snapshot.bid.or(snapshot.last)?;
            let ok = match rule {
                LimitTouchRule::FillAtTouch => bid >= limit,
                LimitTouchRule::RequireCross => bid > limit,
            };
            ok.then_some(bid)
        }
    }
}

/// The effective order type once triggering is accounted for: a touched stop
/// acts as a market order, a touched stop-limit as a limit order.
pub fn effective_type(order: &Order) -> OrderType {
    match order.spec.order_type {
        OrderType::Stop { .. } if order.triggered => OrderType::Market,
        OrderType::StopLimit { limit, .. } if order.triggered => OrderType::Limit { limit },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instrument, OrderId, OrderSpec, StrategyId};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn order(order_type: OrderType, side: OrderSide) -> Order {
        let spec = OrderSpec {
            instrument: Instrument::equity("SPY"),
            side,
            size: dec!(100),
            order_type,
            tif: crate::domain::TimeInForce::Gtc,
            link: None,
        };
        Order::new(
            OrderId(1),
            StrategyId::new("test"),
            spec,
            Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
        )
    }

    fn snapshot(bid: Decimal, ask: Decimal, last: Decimal) -> MarketSnapshot {
        MarketSnapshot {
            bid: Some(bid),
            ask: Some(ask),
            last: Some(last),
        }
    }

    #[test]
    fn buy_stop_touches_on_rising_last() {
        let o = order(OrderType::Stop { stop: dec!(103) }, OrderSide::Buy);
        assert!(!stop_touched(&o, &snapshot(dec!(100), dec!(100.1), dec!(102.9))));
        assert!(stop_touched(&o, &snapshot(dec!(103), dec!(103.2), dec!(103.5))));
    }

    #[test]
    fn limit_touch_vs_cross() {
        let snap = snapshot(dec!(99.9), dec!(100.0), dec!(100.0));
        // Buy limit exactly at the ask.
        assert_eq!(
            limit_satisfied(OrderSide::Buy, dec!(100.0), &snap, LimitTouchRule::FillAtTouch),
            Some(dec!(100.0))
        );
        assert_eq!(
            limit_satisfied(OrderSide::Buy, dec!(100.0), &snap, LimitTouchRule::RequireCross),
            None
        );
    }

    #[test]
    fn triggered_stop_acts_as_market() {
        let mut o = order(OrderType::Stop { stop: dec!(103) }, OrderSide::Buy);
        assert!(!is_actionable(&o));
        o.triggered = true;
        assert!(is_actionable(&o));
        assert_eq!(effective_type(&o), OrderType::Market);
    }
}
