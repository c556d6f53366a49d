//! Market calendars: trading-day tests, session boundaries, business-day
//! arithmetic. Holiday and early-close schedules are opaque data supplied at
//! construction; the engine hardcodes no exchange schedule.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Calendar queries used by the clock, scheduler, and settlement queue.
pub trait MarketCalendar: Send {
    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Whether the venue is open at this instant.
    fn is_trading(&self, ts: DateTime<Utc>) -> bool;

    /// Session open on `date`, if it is a trading day.
    fn session_open(&self, date: NaiveDate) -> Option<DateTime<Utc>>;

    /// Session close on `date`, honouring early closes.
    fn session_close(&self, date: NaiveDate) -> Option<DateTime<Utc>>;

    /// First session open strictly after `ts`.
    fn next_session_open(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Advance `n` business days from `date` (exclusive of `date` itself).
    fn advance_business_days(&self, date: NaiveDate, n: u32) -> NaiveDate;
}

/// Weekday sessions with an explicit holiday set and optional early closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekdayCalendar {
    pub open: NaiveTime,
    pub close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
    early_closes: BTreeMap<NaiveDate, NaiveTime>,
}

impl WeekdayCalendar {
    /// 24h sessions every weekday, no holidays. The common test calendar.
    pub fn full_day() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            holidays: BTreeSet::new(),
            early_closes: BTreeMap::new(),
        }
    }

    pub fn with_hours(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            open,
            close,
            holidays: BTreeSet::new(),
            early_closes: BTreeMap::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn with_early_close(mut self, date: NaiveDate, close: NaiveTime) -> Self {
        self.early_closes.insert(date, close);
        self
    }

    fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl MarketCalendar for WeekdayCalendar {
    fn is_trading_day(&self, date: NaiveDate) -> bool {
        !Self::is_weekend(date) && !self.holidays.contains(&date)
    }

    fn is_trading(&self, ts: DateTime<Utc>) -> bool {
        let date = ts.date_naive();
        if !self.is_trading_day(date) {
            return false;
        }
        let close = self.early_closes.get(&date).copied().unwrap_or(self.close);
        let time = ts.time();
        time >= self.open && time <= close
    }

    fn session_open(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if !self.is_trading_day(date) {
            return None;
        }
        Some(Utc.from_utc_datetime(&date.and_time(self.open)))
    }

    fn session_close(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        if !self.is_trading_day(date) {
            return None;
        }
        let close = self.early_closes.get(&date).copied().unwrap_or(self.close);
        Some(Utc.from_utc_datetime(&date.and_time(close)))
    }

    fn next_session_open(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut date = ts.date_naive();
        // Today's open still counts if it lies ahead of ts.
        for _ in 0..3660 {
            if let Some(open) = self.session_open(date) {
                if open > ts {
                    return Some(open);
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    fn advance_business_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let mut current = date;
        let mut remaining = n;
        while remaining > 0 {
            current = current.succ_opt().expect("date overflow");
            if self.is_trading_day(current) {
                remaining -= 1;
            }
        }
        current
    }
}
