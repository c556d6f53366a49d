//! Execution model implementations: close the gap between post-risk targets
//! and current positions.

use super::{ExecutionModel, PortfolioCtx, StageError};
use crate::domain::{Instrument, OrderSide, OrderSpec};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Sizes below this are noise from decimal division, not intent.
const MIN_ORDER_SIZE: Decimal = dec!(0.00000001);

fn reference_price(instrument: &Instrument, ctx: &PortfolioCtx) -> Option<Decimal> {
    let snapshot = ctx.data.snapshot(instrument);
    snapshot.arrival_price()
}

/// Signed quantity delta needed to move the current position to the target
/// weight of strategy capital.
fn target_delta(
    instrument: &Instrument,
    weight: Decimal,
    ctx: &PortfolioCtx,
) -> Option<Decimal> {
    let price = reference_price(instrument, ctx)?;
    if price <= Decimal::ZERO {
        return None;
    }
    let target_qty = (weight * ctx.capital / price).round_dp(8);
    let current = ctx
        .positions
        .get(instrument)
        .map(|p| p.quantity)
        .unwrap_or(Decimal::ZERO);
    Some(target_qty - current)
}

fn spec_for_delta(instrument: &Instrument, delta: Decimal) -> Option<OrderSpec> {
    if delta.abs() < MIN_ORDER_SIZE {
        return None;
    }
    let side = if delta > Decimal::ZERO { OrderSide::Buy } else { OrderSide::Sell };
    Some(OrderSpec::market(instrument.clone(), side, delta.abs()))
}

/// Emit one market order per instrument for the full delta, immediately.
pub struct ImmediateExecution;

impl ExecutionModel for ImmediateExecution {
    fn orders(
        &mut self,
        targets: &crate::domain::TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<Vec<OrderSpec>, StageError> {
        let mut specs = Vec::new();
        for (instrument, weight) in targets.iter() {
            let Some(delta) = target_delta(instrument, weight, ctx) else {
                continue;
            };
            if let Some(spec) = spec_for_delta(instrument, delta) {
                specs.push(spec);
            }
        }
        Ok(specs)
    }
}

#[derive(Debug, Clone)]
struct SlicePlan {
    side: OrderSide,
    slice_size: Decimal,
    slices_left: u32,
    next_due: DateTime<Utc>,
}

/// Time-sliced execution: the delta for each instrument is split into equal
/// child market orders released on an interval.
pub struct TwapExecution {
    pub slices: u32,
    pub interval: Duration,
    plans: HashMap<Instrument, SlicePlan>,
}

impl TwapExecution {
    pub fn new(slices: u32, interval: Duration) -> Self {
        assert!(slices > 0, "slice count must be positive");
        Self {
            slices,
            interval,
            plans: HashMap::new(),
        }
    }
}

impl ExecutionModel for TwapExecution {
    fn orders(
        &mut self,
        targets: &crate::domain::TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<Vec<OrderSpec>, StageError> {
        let mut specs = Vec::new();

        // New or revised targets replace any existing plan.
        for (instrument, weight) in targets.iter() {
            let Some(delta) = target_delta(instrument, weight, ctx) else {
                continue;
            };
            if delta.abs() < MIN_ORDER_SIZE {
                self.plans.remove(instrument);
                continue;
            }
            let side = if delta > Decimal::ZERO { OrderSide::Buy } else { OrderSide::Sell };
            let slice_size = delta.abs() / Decimal::from(self.slices);
            self.plans.insert(
                instrument.clone(),
                SlicePlan {
                    side,
                    slice_size,
                    slices_left: self.slices,
                    next_due: ctx.now,
                },
            );
        }

        // Release every due slice. Instruments iterate in sorted order for
        // deterministic output.
        let mut due: Vec<Instrument> = self
            .plans
            .iter()
            .filter(|(_, plan)| plan.next_due <= ctx.now && plan.slices_left > 0)
            .map(|(i, _)| i.clone())
            .collect();
        due.sort();

        for instrument in due {
            let plan = self.plans.get_mut(&instrument).expect("plan present");
            plan.slices_left -= 1;
            plan.next_due = ctx.now + self.interval;
            specs.push(OrderSpec::market(instrument.clone(), plan.side, plan.slice_size));
            if plan.slices_left == 0 {
                self.plans.remove(&instrument);
            }
        }
        Ok(specs)
    }
}
