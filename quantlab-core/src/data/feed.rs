//! Data provider boundary.
//!
//! Implementations decode CSV, Parquet, or a live wire protocol upstream;
//! the engine only sees ordered [`MarketEvent`]s and warm-up history.

use crate::domain::{Bar, Instrument, MarketEvent, Resolution};
use chrono::{DateTime, Datelike, Utc};
use std::collections::VecDeque;

/// Opaque registration token returned by [`DataFeed::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Read-only event source. `next_event` must yield events in non-decreasing
/// timestamp order; the clock treats violations as fatal.
pub trait DataFeed: Send {
    fn next_event(&mut self) -> Option<MarketEvent>;

    /// Announce that a series will be consumed, so providers that decode
    /// lazily can scope their work. Providers that pre-load everything can
    /// keep the default.
    fn subscribe(&mut self, instrument: &Instrument, resolution: Resolution) -> SubscriptionHandle {
        SubscriptionHandle(instrument.stable_hash() ^ resolution as u64)
    }

    /// Historical bars ending before `start`, oldest first, for indicator
    /// warm-up. Default: no history available.
    fn warmup(
        &self,
        _instrument: &Instrument,
        _resolution: Resolution,
        _start: DateTime<Utc>,
    ) -> Vec<Bar> {
        Vec::new()
    }
}

/// In-memory feed over a pre-built event sequence. The standard test feed.
#[derive(Debug, Default)]
pub struct VecFeed {
    events: VecDeque<MarketEvent>,
    history: Vec<Bar>,
}

impl VecFeed {
    pub fn new(events: impl IntoIterator<Item = MarketEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: impl IntoIterator<Item = Bar>) -> Self {
        self.history.extend(history);
        self
    }

    /// Build a feed of daily trade bars from closes, one bar per trading day.
    pub fn from_daily_closes(
        instrument: Instrument,
        start: chrono::NaiveDate,
        closes: &[rust_decimal::Decimal],
    ) -> Self {
        use chrono::TimeZone;
        let mut events = Vec::with_capacity(closes.len());
        let mut date = start;
        for close in closes {
            while matches!(
                date.weekday(),
                chrono::Weekday::Sat | chrono::Weekday::Sun
            ) {
                date = date.succ_opt().unwrap();
            }
            let open = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
            let bar = Bar::trade(
                open,
                instrument.clone(),
                Resolution::Day,
                *close,
                *close,
                *close,
                *close,
                rust_decimal::Decimal::from(1_000_000),
            );
            events.push(MarketEvent::from_bar(bar));
            date = date.succ_opt().unwrap();
        }
        Self::new(events)
    }
}

impl DataFeed for VecFeed {
    fn next_event(&mut self) -> Option<MarketEvent> {
        self.events.pop_front()
    }

    fn warmup(
        &self,
        instrument: &Instrument,
        resolution: Resolution,
        start: DateTime<Utc>,
    ) -> Vec<Bar> {
        self.history
            .iter()
            .filter(|b| {
                &b.instrument == instrument
                    && b.resolution == resolution
                    && b.effective_at() <= start
            })
            .cloned()
            .collect()
    }
}
