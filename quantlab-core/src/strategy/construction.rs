//! Portfolio construction implementations.

use super::{PortfolioConstruction, PortfolioCtx, StageError};
use crate::domain::{Signal, TargetPortfolio};
use rust_decimal::Decimal;

/// Equal weight across positive signals. Negative or zero signals map to an
/// explicit zero weight (flatten) in long-only mode, or a symmetric short
/// weight otherwise.
pub struct EqualWeightConstruction {
    pub leverage: Decimal,
    pub long_only: bool,
}

impl EqualWeightConstruction {
    pub fn long_only(leverage: Decimal) -> Self {
        Self { leverage, long_only: true }
    }

    pub fn long_short(leverage: Decimal) -> Self {
        Self { leverage, long_only: false }
    }
}

impl PortfolioConstruction for EqualWeightConstruction {
    fn targets(
        &mut self,
        signals: &[Signal],
        _ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        let mut targets = TargetPortfolio::new();
        if signals.is_empty() {
            return Ok(targets);
        }
        for signal in signals {
            signal.validate()?;
        }

        let directional = signals
            .iter()
            .filter(|s| {
                s.strength > Decimal::ZERO || (!self.long_only && s.strength < Decimal::ZERO)
            })
            .count()
            .max(1);
        let per_name = self.leverage / Decimal::from(directional as u64);

        for signal in signals {
            let weight = if signal.strength > Decimal::ZERO {
                per_name
            } else if signal.strength < Decimal::ZERO && !self.long_only {
                -per_name
            } else {
                Decimal::ZERO
            };
            targets.set(signal.instrument.clone(), weight);
        }
        Ok(targets)
    }
}

/// Weights proportional to strength * confidence, normalised so gross
/// exposure equals `leverage`.
pub struct SignalWeightedConstruction {
    pub leverage: Decimal,
}

impl SignalWeightedConstruction {
    pub fn new(leverage: Decimal) -> Self {
        Self { leverage }
    }
}

impl PortfolioConstruction for SignalWeightedConstruction {
    fn targets(
        &mut self,
        signals: &[Signal],
        _ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        let mut targets = TargetPortfolio::new();
        for signal in signals {
            signal.validate()?;
        }
        let gross: Decimal = signals
            .iter()
            .map(|s| (s.strength * s.confidence).abs())
            .sum();
        if gross == Decimal::ZERO {
            for signal in signals {
                targets.set(signal.instrument.clone(), Decimal::ZERO);
            }
            return Ok(targets);
        }
        for signal in signals {
            let raw = signal.strength * signal.confidence;
            targets.set(signal.instrument.clone(), raw / gross * self.leverage);
        }
        Ok(targets)
    }
}
