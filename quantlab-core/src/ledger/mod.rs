//! Portfolio accounting: cash, settlement, positions, buying power.

pub mod account;
#[allow(clippy::module_inception)]
pub mod ledger;

pub use account::{
    AccountKind, CashAccount, CashMovementKind, FundingStatus, PendingCash, SettlementConfig,
    SettlementMode, ViolationKind, ViolationPolicy,
};
pub use ledger::{
    Ledger, LedgerError, LedgerUpdate, MarginRequirement, PercentOfMarketValue, ViolationRecord,
};
