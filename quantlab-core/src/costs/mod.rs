//! Cost composition: price adjustments (slippage, impact), fee components
//! (commission, regulatory), and session-close accruals (borrow, financing).
//!
//! Price adjustments run before commission is computed. Prices round
//! half-even to the instrument's quote precision; cash rounds to cents.

pub mod commission;
pub mod fees;
pub mod financing;

pub use commission::{PerShareCommission, PercentCommission, TieredCommission};
pub use fees::{BpsSlippage, RegulatoryFee};
pub use financing::{OvernightFinancing, ShortBorrowAccrual};

use crate::domain::{Instrument, MarketSnapshot, OrderSide, Position};
use crate::ledger::CashMovementKind;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

/// A proposed fill before costs are applied.
#[derive(Debug, Clone)]
pub struct FillDraft {
    pub instrument: Instrument,
    pub side: OrderSide,
    pub price: Decimal,
    pub size: Decimal,
    pub snapshot: MarketSnapshot,
    /// Reference price at order acceptance.
    pub arrival_price: Option<Decimal>,
}

/// Adjusts the proposed fill price (slippage, market impact not already
/// captured by the fill model). Returns the new price.
pub trait PriceAdjustment: Send {
    fn adjust(&self, draft: &FillDraft) -> Decimal;
    fn name(&self) -> &'static str;
}

/// One fee line on a fill.
pub trait FeeComponent: Send {
    fn fee(&self, draft: &FillDraft, position: Option<&Position>) -> Decimal;
    fn name(&self) -> &'static str;
}

/// Charges accrued at session close rather than per fill.
pub trait SessionAccrual: Send {
    fn accrue(
        &self,
        positions: &BTreeMap<Instrument, Position>,
        date: NaiveDate,
    ) -> Vec<(CashMovementKind, Decimal)>;
    fn name(&self) -> &'static str;
}

/// Composes the configured adjustments, fees, and accruals.
pub struct CostEngine {
    adjustments: Vec<Box<dyn PriceAdjustment>>,
    fees: Vec<Box<dyn FeeComponent>>,
    accruals: Vec<Box<dyn SessionAccrual>>,
}

impl CostEngine {
    pub fn new() -> Self {
        Self {
            adjustments: Vec::new(),
            fees: Vec::new(),
            accruals: Vec::new(),
        }
    }

    /// No adjustments, no fees, no accruals.
    pub fn frictionless() -> Self {
        Self::new()
    }

    pub fn with_adjustment(mut self, a: Box<dyn PriceAdjustment>) -> Self {
        self.adjustments.push(a);
        self
    }

    pub fn with_fee(mut self, f: Box<dyn FeeComponent>) -> Self {
        self.fees.push(f);
        self
    }

    pub fn with_accrual(mut self, a: Box<dyn SessionAccrual>) -> Self {
        self.accruals.push(a);
        self
    }

    /// Final fill price: all adjustments applied in order, then rounded
    /// half-even to the instrument's quote precision.
    pub fn adjusted_price(&self, draft: &FillDraft) -> Decimal {
        let mut working = draft.clone();
        for adjustment in &self.adjustments {
            working.price = adjustment.adjust(&working);
        }
        working.price.round_dp_with_strategy(
            draft.instrument.quote_precision,
            RoundingStrategy::MidpointNearestEven,
        )
    }

    /// Total commission and fees for the draft, rounded to cents half-even.
    pub fn commission(&self, draft: &FillDraft, position: Option<&Position>) -> Decimal {
        let total: Decimal = self.fees.iter().map(|f| f.fee(draft, position)).sum();
        total.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
    }

    /// Session-close accruals over the current book.
    pub fn accrue(
        &self,
        positions: &BTreeMap<Instrument, Position>,
        date: NaiveDate,
    ) -> Vec<(CashMovementKind, Decimal)> {
        self.accruals
            .iter()
            .flat_map(|a| a.accrue(positions, date))
            .collect()
    }
}

impl Default for CostEngine {
    fn default() -> Self {
        Self::new()
    }
}
