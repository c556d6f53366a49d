//! The five-stage strategy pipeline contract.
//!
//! Universe -> Alpha -> Construction -> Risk -> Execution, each a small
//! trait composed by value. Stages communicate only through the typed
//! artifacts they pass forward and receive explicit read-only context
//! arguments; no stage mutates the ledger directly. The alpha context
//! deliberately excludes portfolio state: alpha is pure with respect to
//! orders and positions.

pub mod allocation;
pub mod alpha;
pub mod construction;
pub mod execution;
pub mod risk;
pub mod universe;

pub use allocation::{CapitalAllocation, EqualAllocation};
pub use alpha::MaCrossoverAlpha;
pub use construction::{EqualWeightConstruction, SignalWeightedConstruction};
pub use execution::{ImmediateExecution, TwapExecution};
pub use risk::{CompositeRisk, DrawdownHalt, GrossLeverageCap, MaxPositionWeight, NoRisk};
pub use universe::{ScheduledUniverse, StaticUniverse};

use crate::data::DataContext;
use crate::domain::{
    Instrument, MarketEvent, Order, OrderSpec, Position, Resolution, Signal, StrategyId,
    TargetPortfolio,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Errors raised by user stages. Caught by the engine, logged as strategy
/// faults, and handled per the configured fault policy.
pub type StageError = anyhow::Error;

/// Context for the alpha stage: market data only.
pub struct AlphaCtx<'a> {
    pub now: DateTime<Utc>,
    pub data: &'a DataContext,
    pub universe: &'a BTreeSet<Instrument>,
}

/// Context for construction, risk, and execution: read-only views of the
/// portfolio alongside the data.
pub struct PortfolioCtx<'a> {
    pub now: DateTime<Utc>,
    pub data: &'a DataContext,
    /// Capital allocated to this strategy.
    pub capital: Decimal,
    pub positions: &'a BTreeMap<Instrument, Position>,
    pub cash: Decimal,
    pub equity: Decimal,
    /// This strategy's orders, including recent rejections, so stages can
    /// observe outcomes of their prior submissions.
    pub orders: &'a [Order],
}

/// Which instruments are tradable right now. Point-in-time correctness is
/// this stage's responsibility: it must never return an instrument that did
/// not exist at the current clock.
pub trait UniverseSelection: Send {
    fn select(
        &mut self,
        now: DateTime<Utc>,
        data: &DataContext,
    ) -> Result<BTreeSet<Instrument>, StageError>;
}

/// Turns market events into directional signals.
pub trait AlphaModel: Send {
    fn on_event(&mut self, event: &MarketEvent, ctx: &AlphaCtx) -> Result<Vec<Signal>, StageError>;
}

/// Turns signals into pre-risk target weights.
pub trait PortfolioConstruction: Send {
    fn targets(
        &mut self,
        signals: &[Signal],
        ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError>;
}

/// Applies caps and halts to pre-risk targets. May return the empty mapping
/// to halt trading.
pub trait RiskModel: Send {
    fn apply(
        &mut self,
        targets: TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError>;
}

/// Produces orders closing the gap between post-risk targets and current
/// positions. The only stage that produces orders.
pub trait ExecutionModel: Send {
    fn orders(
        &mut self,
        targets: &TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<Vec<OrderSpec>, StageError>;
}

/// A complete strategy: the five stages plus its data subscriptions.
pub struct Strategy {
    pub id: StrategyId,
    pub universe: Box<dyn UniverseSelection>,
    pub alpha: Box<dyn AlphaModel>,
    pub construction: Box<dyn PortfolioConstruction>,
    pub risk: Box<dyn RiskModel>,
    pub execution: Box<dyn ExecutionModel>,
    pub subscriptions: Vec<(Instrument, Resolution)>,
}
