//! Instant fill model: market orders at mid, limits on the crossing quote.

use super::{
    effective_type, is_actionable, limit_satisfied, FillContext, FillModel, FillProposal,
    LimitTouchRule,
};
use crate::domain::{Order, OrderType};

/// Fills market orders at the quote mid (bar close when no quote exists) and
/// limit orders as soon as the opposite quote satisfies the limit.
#[derive(Debug, Clone, Copy)]
pub struct InstantFill {
    pub touch: LimitTouchRule,
}

impl InstantFill {
    pub fn new() -> Self {
        Self { touch: LimitTouchRule::FillAtTouch }
    }

    pub fn with_touch(touch: LimitTouchRule) -> Self {
        Self { touch }
    }
}

impl Default for InstantFill {
    fn default() -> Self {
        Self::new()
    }
}

impl FillModel for InstantFill {
    fn propose(&mut self, order: &Order, ctx: &FillContext) -> Vec<FillProposal> {
        if !is_actionable(order) {
            return Vec::new();
        }
        let remaining = order.remaining_qty();
        match effective_type(order) {
            OrderType::Market => {
                let Some(price) = ctx.snapshot.mid().or(ctx.snapshot.last) else {
                    return Vec::new();
                };
                vec![FillProposal { price, size: remaining }]
            }
            OrderType::Limit { limit } => {
                match limit_satisfied(order.spec.side, limit, ctx.snapshot, self.touch) {
                    Some(quote) => vec![FillProposal { price: quote, size: remaining }],
                    None => Vec::new(),
                }
            }
            // Untouched stops are filtered by is_actionable above.
            OrderType::Stop { .. } | OrderType::StopLimit { .. } => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "instant"
    }
}
