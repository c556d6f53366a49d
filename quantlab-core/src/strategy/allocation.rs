//! Capital allocation across strategies.

use crate::domain::StrategyId;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Distributes total portfolio capital among the hosted strategies.
pub trait CapitalAllocation: Send {
    fn allocate(
        &self,
        strategies: &[StrategyId],
        total_capital: Decimal,
    ) -> BTreeMap<StrategyId, Decimal>;
}

/// Equal split of capital across strategies.
pub struct EqualAllocation;

impl CapitalAllocation for EqualAllocation {
    fn allocate(
        &self,
        strategies: &[StrategyId],
        total_capital: Decimal,
    ) -> BTreeMap<StrategyId, Decimal> {
        if strategies.is_empty() {
            return BTreeMap::new();
        }
        let share = total_capital / Decimal::from(strategies.len() as u64);
        strategies.iter().map(|s| (s.clone(), share)).collect()
    }
}
