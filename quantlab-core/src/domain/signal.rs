//! Typed artifacts passed between pipeline stages: signals and target
//! portfolios. Stages never see each other's internal state, only these.

use crate::domain::instrument::Instrument;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Directional view on one instrument, produced by the alpha stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: Instrument,
    /// Direction and conviction in [-1, 1].
    pub strength: Decimal,
    /// Confidence in [0, 1].
    pub confidence: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Opaque to the engine; carried through for downstream stages.
    pub metadata: BTreeMap<String, String>,
}

impl Signal {
    pub fn new(
        instrument: Instrument,
        strength: Decimal,
        confidence: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument,
            strength,
            confidence,
            timestamp,
            metadata: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.strength < -Decimal::ONE || self.strength > Decimal::ONE {
            return Err(SignalError::StrengthOutOfRange(self.strength));
        }
        if self.confidence < Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(SignalError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal strength {0} outside [-1, 1]")]
    StrengthOutOfRange(Decimal),

    #[error("signal confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(Decimal),

    #[error("gross exposure {gross} exceeds leverage cap {cap}")]
    LeverageExceeded { gross: Decimal, cap: Decimal },
}

/// Desired signed weight per instrument as a fraction of strategy capital.
/// Iteration order is deterministic (ordered by instrument).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPortfolio {
    weights: BTreeMap<Instrument, Decimal>,
}

impl TargetPortfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, instrument: Instrument, weight: Decimal) {
        self.weights.insert(instrument, weight);
    }

    pub fn weight(&self, instrument: &Instrument) -> Option<Decimal> {
        self.weights.get(instrument).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Instrument, Decimal)> {
        self.weights.iter().map(|(i, w)| (i, *w))
    }

    /// Sum of absolute weights.
    pub fn gross_exposure(&self) -> Decimal {
        self.weights.values().map(|w| w.abs()).sum()
    }

    pub fn validate(&self, leverage_cap: Decimal) -> Result<(), SignalError> {
        let gross = self.gross_exposure();
        if gross > leverage_cap {
            return Err(SignalError::LeverageExceeded { gross, cap: leverage_cap });
        }
        Ok(())
    }

    /// Scale every weight by the same factor (used by leverage caps).
    pub fn scale(&mut self, factor: Decimal) {
        for w in self.weights.values_mut() {
            *w *= factor;
        }
    }
}

impl FromIterator<(Instrument, Decimal)> for TargetPortfolio {
    fn from_iter<T: IntoIterator<Item = (Instrument, Decimal)>>(iter: T) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}
