//! Session-close accruals: short-borrow and overnight financing.

use super::SessionAccrual;
use crate::domain::{Instrument, Position};
use crate::ledger::CashMovementKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Daily borrow charge on short notional, charged at end of session.
#[derive(Debug, Clone, Copy)]
pub struct ShortBorrowAccrual {
    /// Daily rate as a fraction of short notional.
    pub daily_rate: Decimal,
}

impl ShortBorrowAccrual {
    pub fn new(daily_rate: Decimal) -> Self {
        Self { daily_rate }
    }
}

impl SessionAccrual for ShortBorrowAccrual {
    fn accrue(
        &self,
        positions: &BTreeMap<Instrument, Position>,
        _date: NaiveDate,
    ) -> Vec<(CashMovementKind, Decimal)> {
        let short_notional: Decimal = positions
            .values()
            .filter(|p| p.is_short())
            .filter_map(|p| p.last_mark.map(|m| p.market_value(m).abs()))
            .sum();
        if short_notional == Decimal::ZERO {
            return Vec::new();
        }
        vec![(CashMovementKind::Borrow, -short_notional * self.daily_rate)]
    }

    fn name(&self) -> &'static str {
        "short_borrow"
    }
}

/// Daily financing on positions held overnight.
#[derive(Debug, Clone, Copy)]
pub struct OvernightFinancing {
    /// Daily rate as a fraction of absolute held notional.
    pub daily_rate: Decimal,
}

impl OvernightFinancing {
    pub fn new(daily_rate: Decimal) -> Self {
        Self { daily_rate }
    }
}

impl SessionAccrual for OvernightFinancing {
    fn accrue(
        &self,
        positions: &BTreeMap<Instrument, Position>,
        _date: NaiveDate,
    ) -> Vec<(CashMovementKind, Decimal)> {
        let held_notional: Decimal = positions
            .values()
            .filter(|p| !p.is_flat())
            .filter_map(|p| p.last_mark.map(|m| p.market_value(m).abs()))
            .sum();
        if held_notional == Decimal::ZERO {
            return Vec::new();
        }
        vec![(CashMovementKind::Financing, -held_notional * self.daily_rate)]
    }

    fn name(&self) -> &'static str {
        "overnight_financing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderSide;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn book(qty_sign: OrderSide) -> BTreeMap<Instrument, Position> {
        let spy = Instrument::equity("SPY");
        let mut p = Position::new(spy.clone());
        p.apply_fill(qty_sign, dec!(100), dec!(10));
        p.mark(dec!(100), chrono::Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap());
        BTreeMap::from([(spy, p)])
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn borrow_charges_shorts_only() {
        let accrual = ShortBorrowAccrual::new(dec!(0.0001));
        assert!(accrual.accrue(&book(OrderSide::Buy), date()).is_empty());

        let charges = accrual.accrue(&book(OrderSide::Sell), date());
        assert_eq!(charges, vec![(CashMovementKind::Borrow, dec!(-0.10))]);
    }

    #[test]
    fn financing_charges_any_held_position() {
        let accrual = OvernightFinancing::new(dec!(0.0002));
        let charges = accrual.accrue(&book(OrderSide::Buy), date());
        assert_eq!(charges, vec![(CashMovementKind::Financing, dec!(-0.20))]);
    }
}
