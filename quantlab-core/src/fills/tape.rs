//! Trade-tape fill model: fills are gated on observed trade prints and
//! capped by a participation rate, so large orders work across many ticks.

use super::{effective_type, is_actionable, FillContext, FillModel, FillProposal};
use crate::domain::{MarketPayload, Order, OrderSide, OrderType};
use rust_decimal::Decimal;

/// Fills only against incoming [`TradeTick`](crate::domain::TradeTick)s whose
/// price crosses the order's condition. Fill size is
/// `min(remaining, participation_rate * tick_size)`.
#[derive(Debug, Clone, Copy)]
pub struct TradeTapeFill {
    pub participation_rate: Decimal,
}

impl TradeTapeFill {
    pub fn new(participation_rate: Decimal) -> Self {
        Self { participation_rate }
    }

    fn price_crosses(&self, order: &Order, price: Decimal) -> bool {
        match effective_type(order) {
            OrderType::Market => true,
            OrderType::Limit { limit } => match order.spec.side {
                OrderSide::Buy => price <= limit,
                OrderSide::Sell => price >= limit,
            },
            OrderType::Stop { .. } | OrderType::StopLimit { .. } => false,
        }
    }
}

impl FillModel for TradeTapeFill {
    fn propose(&mut self, order: &Order, ctx: &FillContext) -> Vec<FillProposal> {
        if !is_actionable(order) {
            return Vec::new();
        }
        // Only a trade print for this instrument can fill.
        let Some(event) = ctx.event else {
            return Vec::new();
        };
        if event.instrument != order.spec.instrument {
            return Vec::new();
        }
        let MarketPayload::Trade(tick) = &event.payload else {
            return Vec::new();
        };
        if !self.price_crosses(order, tick.price) {
            return Vec::new();
        }

        let cap = self.participation_rate * tick.size;
        let size = order.remaining_qty().min(cap);
        if size <= Decimal::ZERO {
            return Vec::new();
        }
        vec![FillProposal { price: tick.price, size }]
    }

    fn name(&self) -> &'static str {
        "trade_tape"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instrument, MarketEvent, MarketSnapshot, OrderId, OrderSpec, StrategyId};
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn buy_market(size: Decimal) -> Order {
        Order::new(
            OrderId(1),
            StrategyId::new("test"),
            OrderSpec::market(Instrument::equity("SPY"), OrderSide::Buy, size),
            now(),
        )
    }

    fn tape_event(price: Decimal, size: Decimal) -> MarketEvent {
        MarketEvent::trade_tick(now(), Instrument::equity("SPY"), price, size)
    }

    #[test]
    fn participation_caps_fill_size() {
        let mut model = TradeTapeFill::new(dec!(0.5));
        let order = buy_market(dec!(1000));
        let snap = MarketSnapshot::default();
        let event = tape_event(dec!(10.00), dec!(200));
        let ctx = FillContext { now: now(), snapshot: &snap, event: Some(&event) };

        let proposals = model.propose(&order, &ctx);
        assert_eq!(proposals, vec![FillProposal { price: dec!(10.00), size: dec!(100) }]);
    }

    #[test]
    fn no_event_no_fill() {
        let mut model = TradeTapeFill::new(dec!(0.5));
        let order = buy_market(dec!(1000));
        let snap = MarketSnapshot { last: Some(dec!(10)), ..Default::default() };
        let ctx = FillContext { now: now(), snapshot: &snap, event: None };
        assert!(model.propose(&order, &ctx).is_empty());
    }

    #[test]
    fn limit_requires_price_cross_on_tape() {
        let mut model = TradeTapeFill::new(dec!(1));
        let order = Order::new(
            OrderId(2),
            StrategyId::new("test"),
            OrderSpec::limit(Instrument::equity("SPY"), OrderSide::Buy, dec!(100), dec!(9.95)),
            now(),
        );
        let snap = MarketSnapshot::default();

        let above = tape_event(dec!(10.00), dec!(50));
        let ctx = FillContext { now: now(), snapshot: &snap, event: Some(&above) };
        assert!(model.propose(&order, &ctx).is_empty());

        let through = tape_event(dec!(9.90), dec!(50));
        let ctx = FillContext { now: now(), snapshot: &snap, event: Some(&through) };
        assert_eq!(model.propose(&order, &ctx)[0].size, dec!(50));
    }

    #[test]
    fn other_instrument_tape_is_ignored() {
        let mut model = TradeTapeFill::new(dec!(0.5));
        let order = buy_market(dec!(100));
        let snap = MarketSnapshot::default();
        let event = MarketEvent::trade_tick(now(), Instrument::equity("QQQ"), dec!(10), dec!(100));
        let ctx = FillContext { now: now(), snapshot: &snap, event: Some(&event) };
        assert!(model.propose(&order, &ctx).is_empty());
    }
}
