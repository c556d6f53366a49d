//! Probabilistic fill model: each working order fills this tick with a
//! probability derived from its distance from mid, its size relative to
//! recent traded volume, and a configured base rate.

use super::{effective_type, is_actionable, FillContext, FillModel, FillProposal};
use crate::domain::{Instrument, MarketPayload, Order, OrderSide, OrderType};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

const VOLUME_EWMA_ALPHA: f64 = 0.1;

/// Seeded probabilistic policy with a per-instrument EWMA of trade sizes.
pub struct ProbabilisticFill {
    base_rate: f64,
    rng: ChaCha8Rng,
    avg_trade_size: HashMap<Instrument, f64>,
}

impl ProbabilisticFill {
    pub fn new(base_rate: f64, rng: ChaCha8Rng) -> Self {
        Self {
            base_rate,
            rng,
            avg_trade_size: HashMap::new(),
        }
    }

    fn observe_volume(&mut self, ctx: &FillContext) {
        let Some(event) = ctx.event else { return };
        if let MarketPayload::Trade(tick) = &event.payload {
            let size = tick.size.to_f64().unwrap_or(0.0);
            let avg = self.avg_trade_size.entry(event.instrument.clone()).or_insert(size);
            *avg = (1.0 - VOLUME_EWMA_ALPHA) * *avg + VOLUME_EWMA_ALPHA * size;
        }
    }

    /// Fill probability this tick.
    fn probability(&self, order: &Order, ctx: &FillContext) -> f64 {
        // Distance from mid, measured in spread units. Market orders sit at
        // distance zero.
        let distance = match (effective_type(order), ctx.snapshot.mid(), ctx.snapshot.spread()) {
            (OrderType::Limit { limit }, Some(mid), Some(spread)) if spread > Decimal::ZERO => {
                ((limit - mid).abs() / spread).to_f64().unwrap_or(0.0)
            }
            (OrderType::Limit { .. }, _, _) => 1.0,
            _ => 0.0,
        };

        let size = order.remaining_qty().to_f64().unwrap_or(0.0);
        let avg = self
            .avg_trade_size
            .get(&order.spec.instrument)
            .copied()
            .unwrap_or(size)
            .max(f64::MIN_POSITIVE);
        let size_factor = (avg / size.max(f64::MIN_POSITIVE)).min(1.0);

        (self.base_rate * (-distance).exp() * size_factor).clamp(0.0, 1.0)
    }
}

impl FillModel for ProbabilisticFill {
    fn propose(&mut self, order: &Order, ctx: &FillContext) -> Vec<FillProposal> {
        self.observe_volume(ctx);
        if !is_actionable(order) {
            return Vec::new();
        }

        let price = match effective_type(order) {
            OrderType::Market => match order.spec.side {
                OrderSide::Buy => ctx.snapshot.ask.or(ctx.snapshot.last),
                OrderSide::Sell => ctx.snapshot.bid.or(ctx.snapshot.last),
            },
            OrderType::Limit { limit } => Some(limit),
            OrderType::Stop { .. } | OrderType::StopLimit { .. } => None,
        };
        let Some(price) = price else {
            return Vec::new();
        };

        let p = self.probability(order, ctx);
        // The RNG draw happens for every candidate so the stream advances
        // identically across runs regardless of the outcome.
        let draw: f64 = self.rng.gen();
        if draw < p {
            vec![FillProposal { price, size: order.remaining_qty() }]
        } else {
            Vec::new()
        }
    }

    fn name(&self) -> &'static str {
        "probabilistic"
    }
}
