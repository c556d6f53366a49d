//! Cash account with settlement queue, reservations, and cash-account rule
//! violations.

use crate::domain::AssetClass;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementMode {
    /// T+0: every cash delta hits the settled balance immediately.
    Immediate,
    /// Business-day-delayed settlement, T+k by asset class.
    Realistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountKind {
    Cash,
    Margin,
    PortfolioMargin,
}

/// Why cash moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashMovementKind {
    Trade,
    Settlement,
    Financing,
    Borrow,
    Fee,
    Deposit,
}

/// Cash-account rule breaches involving unsettled proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    GoodFaith,
    FreeRiding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationPolicy {
    /// Record the violation and continue.
    WarnOnly,
    /// Record and reject the offending order pre-trade.
    Reject,
}

/// Settlement lag per asset class, in business days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementConfig {
    pub equity: u32,
    pub option: u32,
    pub future: u32,
    pub forex: u32,
    pub crypto: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            equity: 2,
            option: 1,
            future: 1,
            forex: 2,
            crypto: 0,
        }
    }
}

impl SettlementConfig {
    pub fn days_for(&self, asset_class: AssetClass) -> u32 {
        match asset_class {
            AssetClass::Equity => self.equity,
            AssetClass::Option => self.option,
            AssetClass::Future => self.future,
            AssetClass::Forex => self.forex,
            AssetClass::Crypto => self.crypto,
        }
    }
}

/// A cash delta waiting to settle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCash {
    pub amount: Decimal,
    pub effective: NaiveDate,
    pub kind: CashMovementKind,
}

/// How a purchase was funded, checked when the holding is later sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingStatus {
    Settled,
    /// Funded by proceeds that settle on the given date.
    UnsettledProceeds { until: NaiveDate },
    /// Not covered by settled or unsettled funds at trade time.
    Unfunded { until: NaiveDate },
}

/// Settled balance, FIFO pending queue, and reservations for working buys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashAccount {
    pub currency: String,
    settled: Decimal,
    pending: VecDeque<PendingCash>,
    reserved: Decimal,
}

impl CashAccount {
    pub fn new(currency: impl Into<String>, initial: Decimal) -> Self {
        Self {
            currency: currency.into(),
            settled: initial,
            pending: VecDeque::new(),
            reserved: Decimal::ZERO,
        }
    }

    pub fn settled(&self) -> Decimal {
        self.settled
    }

    /// Net of all pending deltas.
    pub fn unsettled(&self) -> Decimal {
        self.pending.iter().map(|p| p.amount).sum()
    }

    pub fn reserved(&self) -> Decimal {
        self.reserved
    }

    pub fn total(&self) -> Decimal {
        self.settled + self.unsettled()
    }

    pub fn pending_entries(&self) -> impl Iterator<Item = &PendingCash> {
        self.pending.iter()
    }

    /// Post a delta. Immediate mode hits the settled balance; realistic mode
    /// queues it until `effective`.
    pub fn post(
        &mut self,
        amount: Decimal,
        kind: CashMovementKind,
        effective: NaiveDate,
        mode: SettlementMode,
    ) {
        match mode {
            SettlementMode::Immediate => self.settled += amount,
            SettlementMode::Realistic => {
                self.pending.push_back(PendingCash { amount, effective, kind });
            }
        }
    }

    /// Settle every queued entry whose effective date is at or before
    /// `date`, in queue (timestamp) order. Returns the settled entries.
    pub fn settle_through(&mut self, date: NaiveDate) -> Vec<PendingCash> {
        let mut settled = Vec::new();
        // FIFO queue is in insertion order; effective dates are non-decreasing
        // because postings advance with the clock.
        while let Some(front) = self.pending.front() {
            if front.effective > date {
                break;
            }
            let entry = self.pending.pop_front().expect("front entry present");
            self.settled += entry.amount;
            settled.push(entry);
        }
        settled
    }

    pub fn reserve(&mut self, amount: Decimal) {
        self.reserved += amount;
    }

    pub fn release(&mut self, amount: Decimal) {
        self.reserved = (self.reserved - amount).max(Decimal::ZERO);
    }
}
