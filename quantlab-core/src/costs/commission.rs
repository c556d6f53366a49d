//! Commission schedules.

use super::{FeeComponent, FillDraft};
use crate::domain::Position;
use rust_decimal::Decimal;

/// Fixed rate per share/unit with a per-order minimum.
#[derive(Debug, Clone, Copy)]
pub struct PerShareCommission {
    pub rate: Decimal,
    pub minimum: Decimal,
}

impl PerShareCommission {
    pub fn new(rate: Decimal, minimum: Decimal) -> Self {
        Self { rate, minimum }
    }
}

impl FeeComponent for PerShareCommission {
    fn fee(&self, draft: &FillDraft, _position: Option<&Position>) -> Decimal {
        (self.rate * draft.size).max(self.minimum)
    }

    fn name(&self) -> &'static str {
        "per_share_commission"
    }
}

/// Percentage of notional with a per-order minimum.
#[derive(Debug, Clone, Copy)]
pub struct PercentCommission {
    /// Fraction of notional, e.g. 0.001 = 10 bps.
    pub rate: Decimal,
    pub minimum: Decimal,
}

impl PercentCommission {
    pub fn new(rate: Decimal, minimum: Decimal) -> Self {
        Self { rate, minimum }
    }
}

impl FeeComponent for PercentCommission {
    fn fee(&self, draft: &FillDraft, _position: Option<&Position>) -> Decimal {
        (draft.price * draft.size * self.rate).max(self.minimum)
    }

    fn name(&self) -> &'static str {
        "percent_commission"
    }
}

/// Size-tiered per-share rates. Tiers are (upper size bound, rate), sorted
/// ascending; the last tier's rate applies beyond its bound.
#[derive(Debug, Clone)]
pub struct TieredCommission {
    tiers: Vec<(Decimal, Decimal)>,
    pub minimum: Decimal,
}

impl TieredCommission {
    pub fn new(mut tiers: Vec<(Decimal, Decimal)>, minimum: Decimal) -> Self {
        tiers.sort_by(|a, b| a.0.cmp(&b.0));
        Self { tiers, minimum }
    }

    fn rate_for(&self, size: Decimal) -> Decimal {
        for (bound, rate) in &self.tiers {
            if size <= *bound {
                return *rate;
            }
        }
        self.tiers.last().map(|(_, r)| *r).unwrap_or(Decimal::ZERO)
    }
}

impl FeeComponent for TieredCommission {
    fn fee(&self, draft: &FillDraft, _position: Option<&Position>) -> Decimal {
        (self.rate_for(draft.size) * draft.size).max(self.minimum)
    }

    fn name(&self) -> &'static str {
        "tiered_commission"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instrument, MarketSnapshot, OrderSide};
    use rust_decimal_macros::dec;

    fn draft(size: Decimal) -> FillDraft {
        FillDraft {
            instrument: Instrument::equity("SPY"),
            side: OrderSide::Buy,
            price: dec!(100),
            size,
            snapshot: MarketSnapshot::default(),
            arrival_price: None,
        }
    }

    #[test]
    fn per_share_respects_minimum() {
        let c = PerShareCommission::new(dec!(0.005), dec!(1.00));
        assert_eq!(c.fee(&draft(dec!(10)), None), dec!(1.00)); // 0.05 < min
        assert_eq!(c.fee(&draft(dec!(1000)), None), dec!(5.00));
    }

    #[test]
    fn percent_of_notional() {
        let c = PercentCommission::new(dec!(0.001), dec!(0.50));
        assert_eq!(c.fee(&draft(dec!(100)), None), dec!(10.00)); // 100*100*0.001
    }

    #[test]
    fn tiered_rate_selection() {
        let c = TieredCommission::new(
            vec![(dec!(100), dec!(0.01)), (dec!(1000), dec!(0.005))],
            Decimal::ZERO,
        );
        assert_eq!(c.fee(&draft(dec!(50)), None), dec!(0.50));
        assert_eq!(c.fee(&draft(dec!(500)), None), dec!(2.500));
        // Beyond the last bound, the last rate applies.
        assert_eq!(c.fee(&draft(dec!(2000)), None), dec!(10.000));
    }
}
