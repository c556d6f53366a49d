//! The portfolio ledger — the single serial point through which every
//! position and cash mutation flows.

use crate::calendar::MarketCalendar;
use crate::domain::{Fill, Instrument, OrderSide, Position};
use crate::ledger::account::{
    AccountKind, CashAccount, CashMovementKind, FundingStatus, PendingCash, SettlementConfig,
    SettlementMode, ViolationKind,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Internal reconciliation failed. Fatal; the run aborts and the log is
    /// sealed.
    #[error("cash reconciliation mismatch: expected {expected}, actual {actual}")]
    Reconciliation { expected: Decimal, actual: Decimal },

    #[error("no mark price for {0}")]
    MissingMark(Instrument),
}

/// Pluggable risk-based requirement for portfolio-margin accounts.
pub trait MarginRequirement: Send {
    fn requirement(&self, positions: &BTreeMap<Instrument, Position>) -> Decimal;
}

/// Flat percentage-of-market-value requirement. The default portfolio-margin
/// risk function.
pub struct PercentOfMarketValue(pub Decimal);

impl MarginRequirement for PercentOfMarketValue {
    fn requirement(&self, positions: &BTreeMap<Instrument, Position>) -> Decimal {
        positions
            .values()
            .filter_map(|p| p.last_mark.map(|m| p.market_value(m).abs() * self.0))
            .sum()
    }
}

/// Outcome of applying one fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub realized_pnl: Decimal,
    pub cash_amount: Decimal,
    pub cash_settled: bool,
    pub effective: Option<NaiveDate>,
    pub violation: Option<ViolationKind>,
}

/// A recorded cash-account rule violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub kind: ViolationKind,
    pub instrument: Instrument,
    pub date: NaiveDate,
}

pub struct Ledger {
    mode: SettlementMode,
    kind: AccountKind,
    settlement: SettlementConfig,
    account: CashAccount,
    positions: BTreeMap<Instrument, Position>,
    capital_base: Decimal,
    /// Funding tags for open purchases, checked when the holding is sold.
    funding: BTreeMap<Instrument, FundingStatus>,
    violations: Vec<ViolationRecord>,
    margin_fn: Box<dyn MarginRequirement>,
    /// Running sum of all posted cash deltas, for reconciliation.
    posted: Decimal,
}

impl Ledger {
    pub fn new(capital: Decimal, currency: &str, mode: SettlementMode, kind: AccountKind) -> Self {
        Self {
            mode,
            kind,
            settlement: SettlementConfig::default(),
            account: CashAccount::new(currency, capital),
            positions: BTreeMap::new(),
            capital_base: capital,
            funding: BTreeMap::new(),
            violations: Vec::new(),
            margin_fn: Box::new(PercentOfMarketValue(dec!(0.15))),
            posted: Decimal::ZERO,
        }
    }

    pub fn with_settlement(mut self, settlement: SettlementConfig) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn with_margin_requirement(mut self, f: Box<dyn MarginRequirement>) -> Self {
        self.margin_fn = f;
        self
    }

    pub fn account(&self) -> &CashAccount {
        &self.account
    }

    pub fn capital_base(&self) -> Decimal {
        self.capital_base
    }

    pub fn positions(&self) -> &BTreeMap<Instrument, Position> {
        &self.positions
    }

    pub fn position(&self, instrument: &Instrument) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn position_qty(&self, instrument: &Instrument) -> Decimal {
        self.positions
            .get(instrument)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn violations(&self) -> &[ViolationRecord] {
        &self.violations
    }

    pub fn settlement_days(&self, instrument: &Instrument) -> u32 {
        self.settlement.days_for(instrument.asset_class)
    }

    /// Round a cash amount to cents, half-even.
    pub fn round_cash(amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
    }

    /// Apply one fill: position effect, realized P&L, cash posting with
    /// settlement lag, violation tagging. The one write path for trades.
    pub fn apply_fill(
        &mut self,
        fill: &Fill,
        calendar: &dyn MarketCalendar,
    ) -> Result<LedgerUpdate, LedgerError> {
        let trade_date = fill.timestamp.date_naive();
        let effective = match self.mode {
            SettlementMode::Immediate => trade_date,
            SettlementMode::Realistic => {
                calendar.advance_business_days(trade_date, self.settlement_days(&fill.instrument))
            }
        };

        // Violation check precedes the position effect so funding tags refer
        // to the pre-trade state.
        let violation = if self.kind == AccountKind::Cash && self.mode == SettlementMode::Realistic
        {
            self.check_violation(fill, trade_date, effective)
        } else {
            None
        };

        let position = self
            .positions
            .entry(fill.instrument.clone())
            .or_insert_with(|| Position::new(fill.instrument.clone()));
        let realized = position.apply_fill(fill.side, fill.price, fill.size);
        position.mark(fill.price, fill.timestamp);
        if position.is_flat() {
            self.funding.remove(&fill.instrument);
        }

        let cash = Self::round_cash(fill.cash_delta());
        self.account
            .post(cash, CashMovementKind::Trade, effective, self.mode);
        self.posted += cash;
        self.verify()?;

        if let Some(kind) = violation {
            self.violations.push(ViolationRecord {
                kind,
                instrument: fill.instrument.clone(),
                date: trade_date,
            });
        }

        Ok(LedgerUpdate {
            realized_pnl: realized,
            cash_amount: cash,
            cash_settled: self.mode == SettlementMode::Immediate,
            effective: (self.mode == SettlementMode::Realistic).then_some(effective),
            violation,
        })
    }

    /// Tag buys with the settlement status of the funds used; flag sells
    /// that break the good-faith or free-riding rules.
    fn check_violation(
        &mut self,
        fill: &Fill,
        trade_date: NaiveDate,
        effective: NaiveDate,
    ) -> Option<ViolationKind> {
        match fill.side {
            OrderSide::Buy => {
                let cost = fill.price * fill.size + fill.commission;
                // Pending debits reduce spendable settled funds immediately;
                // pending credits only count as unsettled proceeds.
                let pending_debits: Decimal = self
                    .account
                    .pending_entries()
                    .filter(|p| p.amount < Decimal::ZERO)
                    .map(|p| p.amount)
                    .sum();
                let settled = self.account.settled() + pending_debits;
                let status = if settled >= cost {
                    FundingStatus::Settled
                } else if settled + self.account.unsettled() - pending_debits >= cost {
                    let until = self
                        .account
                        .pending_entries()
                        .filter(|p| p.amount > Decimal::ZERO)
                        .map(|p| p.effective)
                        .max()
                        .unwrap_or(trade_date);
                    FundingStatus::UnsettledProceeds { until }
                } else {
                    // Payment for this buy is due at its own settlement.
                    FundingStatus::Unfunded { until: effective }
                };
                self.funding.insert(fill.instrument.clone(), status);
                None
            }
            OrderSide::Sell => match self.funding.get(&fill.instrument) {
                Some(FundingStatus::UnsettledProceeds { until }) if trade_date < *until => {
                    Some(ViolationKind::GoodFaith)
                }
                Some(FundingStatus::Unfunded { until }) if trade_date < *until => {
                    Some(ViolationKind::FreeRiding)
                }
                _ => None,
            },
        }
    }

    /// Whether selling this instrument on `date` would breach the cash
    /// account rules, given how its purchase was funded. Used for pre-trade
    /// rejection when the violation policy escalates.
    pub fn pending_sell_violation(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
    ) -> Option<ViolationKind> {
        match self.funding.get(instrument)? {
            FundingStatus::UnsettledProceeds { until } if date < *until => {
                Some(ViolationKind::GoodFaith)
            }
            FundingStatus::Unfunded { until } if date < *until => Some(ViolationKind::FreeRiding),
            _ => None,
        }
    }

    /// Post a non-trade cash movement (financing, borrow, fees, deposits).
    pub fn post_cash(&mut self, kind: CashMovementKind, amount: Decimal, date: NaiveDate) {
        let amount = Self::round_cash(amount);
        // Accruals settle immediately in both modes.
        self.account.post(amount, kind, date, SettlementMode::Immediate);
        self.posted += amount;
    }

    /// Settle all pending entries effective at or before `date`.
    pub fn settle_through(&mut self, date: NaiveDate) -> Vec<PendingCash> {
        self.account.settle_through(date)
    }

    pub fn mark(&mut self, instrument: &Instrument, price: Decimal, at: DateTime<Utc>) {
        if let Some(position) = self.positions.get_mut(instrument) {
            position.mark(price, at);
        }
    }

    pub fn reserve(&mut self, amount: Decimal) {
        self.account.reserve(amount);
    }

    pub fn release(&mut self, amount: Decimal) {
        self.account.release(amount);
    }

    /// Total market value of all positions at their last marks.
    pub fn positions_value(&self) -> Decimal {
        self.positions
            .values()
            .filter_map(|p| p.last_mark.map(|m| p.market_value(m)))
            .sum()
    }

    pub fn long_market_value(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.is_long())
            .filter_map(|p| p.last_mark.map(|m| p.market_value(m)))
            .sum()
    }

    pub fn short_notional(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.is_short())
            .filter_map(|p| p.last_mark.map(|m| p.market_value(m).abs()))
            .sum()
    }

    pub fn net_liquidation(&self) -> Decimal {
        self.account.total() + self.positions_value()
    }

    /// Spendable capital under the account's rules.
    pub fn buying_power(&self) -> Decimal {
        match self.kind {
            AccountKind::Cash => self.account.settled() - self.account.reserved(),
            AccountKind::Margin => {
                let equity_base =
                    self.account.total() + dec!(0.5) * self.long_market_value();
                equity_base * Decimal::TWO - self.positions_value()
            }
            AccountKind::PortfolioMargin => {
                self.net_liquidation() - self.margin_fn.requirement(&self.positions)
            }
        }
    }

    /// Sum of realized P&L across all positions.
    pub fn realized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.realized_pnl).sum()
    }

    /// Internal reconciliation: the account must equal the capital base plus
    /// every posted delta. A mismatch is an invariant violation and fatal.
    fn verify(&self) -> Result<(), LedgerError> {
        let expected = self.capital_base + self.posted;
        let actual = self.account.total();
        if expected != actual {
            return Err(LedgerError::Reconciliation { expected, actual });
        }
        Ok(())
    }
}
