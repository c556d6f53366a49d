//! Spread-aware fill model: market orders cross the spread.

use super::{
    effective_type, is_actionable, limit_satisfied, FillContext, FillModel, FillProposal,
    LimitTouchRule,
};
use crate::domain::{Order, OrderSide, OrderType};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Market buys lift the ask, sells hit the bid. Limit fills require the
/// cross, with optional extra slippage in basis points applied adversely.
#[derive(Debug, Clone, Copy)]
pub struct SpreadAwareFill {
    pub touch: LimitTouchRule,
    pub extra_slippage_bps: Decimal,
}

impl SpreadAwareFill {
    pub fn new(extra_slippage_bps: Decimal) -> Self {
        Self {
            touch: LimitTouchRule::FillAtTouch,
            extra_slippage_bps,
        }
    }

    pub fn with_touch(mut self, touch: LimitTouchRule) -> Self {
        self.touch = touch;
        self
    }

    fn slip(&self, price: Decimal, side: OrderSide) -> Decimal {
        if self.extra_slippage_bps == Decimal::ZERO {
            return price;
        }
        let fraction = self.extra_slippage_bps / dec!(10000);
        match side {
            OrderSide::Buy => price * (Decimal::ONE + fraction),
            OrderSide::Sell => price * (Decimal::ONE - fraction),
        }
    }
}

impl FillModel for SpreadAwareFill {
    fn propose(&mut self, order: &Order, ctx: &FillContext) -> Vec<FillProposal> {
        if !is_actionable(order) {
            return Vec::new();
        }
        let remaining = order.remaining_qty();
        match effective_type(order) {
            OrderType::Market => {
                let price = match order.spec.side {
                    OrderSide::Buy => ctx.snapshot.ask.or(ctx.snapshot.last),
                    OrderSide::Sell => ctx.snapshot.bid.or(ctx.snapshot.last),
                };
                let Some(price) = price else {
                    return Vec::new();
                };
                vec![FillProposal { price, size: remaining }]
            }
            OrderType::Limit { limit } => {
                match limit_satisfied(order.spec.side, limit, ctx.snapshot, self.touch) {
                    Some(quote) => vec![FillProposal {
                        price: self.slip(quote, order.spec.side),
                        size: remaining,
                    }],
                    None => Vec::new(),
                }
            }
            OrderType::Stop { .. } | OrderType::StopLimit { .. } => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "spread_aware"
    }
}
