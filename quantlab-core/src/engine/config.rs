//! Run configuration.

use crate::data::BarPriceSource;
use crate::domain::{Instrument, Resolution};
use crate::latency::LatencyConfig;
use crate::ledger::{AccountKind, SettlementConfig, SettlementMode, ViolationPolicy};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("backtest start {start} is not before end {end}")]
    InvalidRange { start: DateTime<Utc>, end: DateTime<Utc> },

    #[error("capital base {0} must be positive")]
    NonPositiveCapital(Decimal),

    #[error("leverage cap {0} must be positive")]
    NonPositiveLeverage(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Backtest,
    Paper,
    Live,
}

/// What happens when a user stage raises an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultPolicy {
    /// Halt the offending strategy: no further orders, open orders
    /// cancelled, positions flattened through the execution path.
    HaltStrategy,
    /// Abort the whole run.
    AbortRun,
}

/// Bars required per series before a strategy may submit orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmupPolicy {
    pub default_bars: u64,
    pub per_series: BTreeMap<(Instrument, Resolution), u64>,
}

impl WarmupPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn bars(default_bars: u64) -> Self {
        Self {
            default_bars,
            per_series: BTreeMap::new(),
        }
    }

    pub fn horizon(&self, instrument: &Instrument, resolution: Resolution) -> u64 {
        self.per_series
            .get(&(instrument.clone(), resolution))
            .copied()
            .unwrap_or(self.default_bars)
    }
}

/// Everything a run needs beyond the wired components.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub capital: Decimal,
    pub currency: String,
    pub mode: ExecutionMode,
    pub settlement_mode: SettlementMode,
    pub settlement: SettlementConfig,
    pub account: AccountKind,
    pub seed: u64,
    pub latency: LatencyConfig,
    pub warmup: WarmupPolicy,
    pub fault_policy: FaultPolicy,
    pub violation_policy: ViolationPolicy,
    pub leverage_cap: Decimal,
    /// Reference price when fills derive from bar data.
    pub bar_price: BarPriceSource,
}

impl RunConfig {
    pub fn backtest(start: DateTime<Utc>, end: DateTime<Utc>, capital: Decimal) -> Self {
        Self {
            start,
            end,
            capital,
            currency: "USD".to_string(),
            mode: ExecutionMode::Backtest,
            settlement_mode: SettlementMode::Immediate,
            settlement: SettlementConfig::default(),
            account: AccountKind::Cash,
            seed: 0,
            latency: LatencyConfig::zero(),
            warmup: WarmupPolicy::none(),
            fault_policy: FaultPolicy::HaltStrategy,
            violation_policy: ViolationPolicy::WarnOnly,
            leverage_cap: Decimal::ONE,
            bar_price: BarPriceSource::Close,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_settlement(mut self, mode: SettlementMode) -> Self {
        self.settlement_mode = mode;
        self
    }

    pub fn with_account(mut self, account: AccountKind) -> Self {
        self.account = account;
        self
    }

    pub fn with_latency(mut self, latency: LatencyConfig) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_warmup(mut self, warmup: WarmupPolicy) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Fatal at engine startup on invalid parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start >= self.end {
            return Err(ConfigError::InvalidRange { start: self.start, end: self.end });
        }
        if self.capital <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveCapital(self.capital));
        }
        if self.leverage_cap <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveLeverage(self.leverage_cap));
        }
        Ok(())
    }
}
