//! Subscription routing: which strategies observe which (instrument,
//! resolution) pairs. Memory and CPU scale with what is observed, not with
//! what exists.

use crate::domain::{Instrument, Resolution, StrategyId};
use std::collections::BTreeSet;

/// Set of (strategy, instrument, resolution) registrations. Changes take
/// effect from the next event.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    entries: BTreeSet<(StrategyId, Instrument, Resolution)>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, strategy: StrategyId, instrument: Instrument, resolution: Resolution) {
        self.entries.insert((strategy, instrument, resolution));
    }

    pub fn remove(&mut self, strategy: &StrategyId, instrument: &Instrument, resolution: Resolution) {
        self.entries
            .remove(&(strategy.clone(), instrument.clone(), resolution));
    }

    pub fn contains(
        &self,
        strategy: &StrategyId,
        instrument: &Instrument,
        resolution: Resolution,
    ) -> bool {
        self.entries
            .contains(&(strategy.clone(), instrument.clone(), resolution))
    }

    /// Strategies subscribed to this (instrument, resolution), in
    /// deterministic (ordered) sequence.
    pub fn recipients(&self, instrument: &Instrument, resolution: Resolution) -> Vec<StrategyId> {
        self.entries
            .iter()
            .filter(|(_, i, r)| i == instrument && *r == resolution)
            .map(|(s, _, _)| s.clone())
            .collect()
    }

    /// All (instrument, resolution) pairs a strategy is registered for.
    pub fn of_strategy(&self, strategy: &StrategyId) -> Vec<(Instrument, Resolution)> {
        self.entries
            .iter()
            .filter(|(s, _, _)| s == strategy)
            .map(|(_, i, r)| (i.clone(), *r))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_only_to_registered_strategies() {
        let mut subs = SubscriptionSet::new();
        let spy = Instrument::equity("SPY");
        let qqq = Instrument::equity("QQQ");
        let alpha = StrategyId::new("alpha");
        let beta = StrategyId::new("beta");

        subs.add(alpha.clone(), spy.clone(), Resolution::Day);
        subs.add(beta.clone(), qqq.clone(), Resolution::Day);

        assert_eq!(subs.recipients(&spy, Resolution::Day), vec![alpha.clone()]);
        assert_eq!(subs.recipients(&qqq, Resolution::Day), vec![beta]);
        assert!(subs.recipients(&spy, Resolution::Minute).is_empty());
    }

    #[test]
    fn removal_takes_effect() {
        let mut subs = SubscriptionSet::new();
        let spy = Instrument::equity("SPY");
        let alpha = StrategyId::new("alpha");

        subs.add(alpha.clone(), spy.clone(), Resolution::Day);
        assert!(subs.contains(&alpha, &spy, Resolution::Day));
        subs.remove(&alpha, &spy, Resolution::Day);
        assert!(!subs.contains(&alpha, &spy, Resolution::Day));
        assert!(subs.recipients(&spy, Resolution::Day).is_empty());
    }

    #[test]
    fn recipients_are_ordered() {
        let mut subs = SubscriptionSet::new();
        let spy = Instrument::equity("SPY");
        subs.add(StrategyId::new("zeta"), spy.clone(), Resolution::Day);
        subs.add(StrategyId::new("alpha"), spy.clone(), Resolution::Day);
        let names: Vec<String> = subs
            .recipients(&spy, Resolution::Day)
            .into_iter()
            .map(|s| s.0)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
