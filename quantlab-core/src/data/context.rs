//! Point-in-time market data cache.
//!
//! Holds the most recent bar and a bounded lookback ring per (instrument,
//! resolution), plus the latest top-of-book snapshot per instrument. Accessors
//! never expose data whose effective timestamp exceeds the clock's current
//! time; this is the structural defense against look-ahead leakage.

use crate::domain::{
    Bar, DataError, Instrument, MarketEvent, MarketPayload, MarketSnapshot, Resolution,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

const DEFAULT_LOOKBACK: usize = 256;

/// Which bar price feeds the reference snapshot at bar resolution. Fill
/// models price off the snapshot, so this selects the bar fill reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarPriceSource {
    Open,
    #[default]
    Close,
}

#[derive(Debug, Default)]
struct Series {
    bars: VecDeque<Bar>,
    /// Total bars ever delivered, independent of ring eviction.
    seen: u64,
}

/// Bounded per-series cache with a point-in-time guard.
pub struct DataContext {
    now: Option<DateTime<Utc>>,
    default_capacity: usize,
    capacity: BTreeMap<Resolution, usize>,
    bar_price: BarPriceSource,
    series: HashMap<(Instrument, Resolution), Series>,
    snapshots: HashMap<Instrument, MarketSnapshot>,
}

impl DataContext {
    pub fn new() -> Self {
        Self {
            now: None,
            default_capacity: DEFAULT_LOOKBACK,
            capacity: BTreeMap::new(),
            bar_price: BarPriceSource::default(),
            series: HashMap::new(),
            snapshots: HashMap::new(),
        }
    }

    /// Select which bar price becomes the snapshot reference.
    pub fn with_bar_price(mut self, source: BarPriceSource) -> Self {
        self.bar_price = source;
        self
    }

    /// Override the ring capacity for one resolution (sized to the declared
    /// warm-up for that resolution).
    pub fn with_capacity(mut self, resolution: Resolution, capacity: usize) -> Self {
        self.capacity.insert(resolution, capacity);
        self
    }

    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.now
    }

    /// Move the context clock forward. Mutation happens between ticks; the
    /// context is read-only while the pipeline runs.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.now = Some(now);
    }

    /// Ingest one event: validates bar payloads, updates the lookback ring
    /// and the instrument snapshot.
    pub fn update(&mut self, event: &MarketEvent) -> Result<(), DataError> {
        match &event.payload {
            MarketPayload::Bar(bar) => {
                bar.validate()?;
                self.push_bar(bar.clone());
                let snap = self.snapshots.entry(event.instrument.clone()).or_default();
                match (&bar.data, self.bar_price) {
                    (crate::domain::BarData::Trade(t), BarPriceSource::Close) => {
                        snap.last = Some(t.close);
                    }
                    (crate::domain::BarData::Trade(t), BarPriceSource::Open) => {
                        snap.last = Some(t.open);
                    }
                    (crate::domain::BarData::Quote(q), BarPriceSource::Close) => {
                        snap.bid = Some(q.bid_close);
                        snap.ask = Some(q.ask_close);
                    }
                    (crate::domain::BarData::Quote(q), BarPriceSource::Open) => {
                        snap.bid = Some(q.bid_open);
                        snap.ask = Some(q.ask_open);
                    }
                }
            }
            MarketPayload::Trade(t) => {
                let snap = self.snapshots.entry(event.instrument.clone()).or_default();
                snap.last = Some(t.price);
            }
            MarketPayload::Quote(q) => {
                if q.bid > q.ask {
                    return Err(DataError::CrossedQuote { bid: q.bid, ask: q.ask });
                }
                let snap = self.snapshots.entry(event.instrument.clone()).or_default();
                snap.bid = Some(q.bid);
                snap.ask = Some(q.ask);
            }
            MarketPayload::Depth(depth) => {
                let snap = self.snapshots.entry(event.instrument.clone()).or_default();
                snap.bid = depth.bids.first().map(|(p, _)| *p);
                snap.ask = depth.asks.first().map(|(p, _)| *p);
            }
        }
        Ok(())
    }

    /// Pre-load warm-up history. Bars still pass the effective-time guard on
    /// read, so future history cannot leak.
    pub fn preload(&mut self, bars: impl IntoIterator<Item = Bar>) -> Result<(), DataError> {
        for bar in bars {
            bar.validate()?;
            self.push_bar(bar);
        }
        Ok(())
    }

    fn push_bar(&mut self, bar: Bar) {
        let cap = self
            .capacity
            .get(&bar.resolution)
            .copied()
            .unwrap_or(self.default_capacity);
        let series = self
            .series
            .entry((bar.instrument.clone(), bar.resolution))
            .or_default();
        series.bars.push_back(bar);
        series.seen += 1;
        while series.bars.len() > cap {
            series.bars.pop_front();
        }
    }

    fn visible(&self, bar: &Bar) -> bool {
        match self.now {
            Some(now) => bar.effective_at() <= now,
            None => false,
        }
    }

    /// Most recent visible bar.
    pub fn bar(&self, instrument: &Instrument, resolution: Resolution) -> Option<&Bar> {
        self.series
            .get(&(instrument.clone(), resolution))?
            .bars
            .iter()
            .rev()
            .find(|b| self.visible(b))
    }

    /// Last `count` visible bars, oldest first.
    pub fn bars(&self, instrument: &Instrument, resolution: Resolution, count: usize) -> Vec<&Bar> {
        let Some(series) = self.series.get(&(instrument.clone(), resolution)) else {
            return Vec::new();
        };
        let mut out: Vec<&Bar> = series
            .bars
            .iter()
            .rev()
            .filter(|b| self.visible(b))
            .take(count)
            .collect();
        out.reverse();
        out
    }

    pub fn has_bar(&self, instrument: &Instrument, resolution: Resolution) -> bool {
        self.bar(instrument, resolution).is_some()
    }

    /// Count of bars ever delivered for the series (drives warm-up).
    pub fn bars_seen(&self, instrument: &Instrument, resolution: Resolution) -> u64 {
        self.series
            .get(&(instrument.clone(), resolution))
            .map(|s| s.seen)
            .unwrap_or(0)
    }

    /// Latest top-of-book snapshot for the instrument.
    pub fn snapshot(&self, instrument: &Instrument) -> MarketSnapshot {
        self.snapshots.get(instrument).cloned().unwrap_or_default()
    }
}

impl Default for DataContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn daily_bar(day: u32, close: rust_decimal::Decimal) -> Bar {
        Bar::trade(
            ts(day),
            Instrument::equity("SPY"),
            Resolution::Day,
            close,
            close,
            close,
            close,
            dec!(1000),
        )
    }

    #[test]
    fn future_bars_are_invisible() {
        let mut ctx = DataContext::new();
        let spy = Instrument::equity("SPY");
        let bar = daily_bar(2, dec!(100));

        // Bar is effective at Jan 3; clock still at Jan 2.
        ctx.advance(ts(2));
        ctx.update(&MarketEvent::from_bar(bar.clone())).unwrap();
        assert!(ctx.bar(&spy, Resolution::Day).is_none());

        ctx.advance(ts(3));
        assert_eq!(ctx.bar(&spy, Resolution::Day).unwrap().close_price(), dec!(100));
    }

    #[test]
    fn lookback_is_ordered_oldest_first() {
        let mut ctx = DataContext::new();
        let spy = Instrument::equity("SPY");
        for day in 2..=5 {
            ctx.update(&MarketEvent::from_bar(daily_bar(day, rust_decimal::Decimal::from(day))))
                .unwrap();
        }
        ctx.advance(ts(10));
        let closes: Vec<_> = ctx
            .bars(&spy, Resolution::Day, 3)
            .iter()
            .map(|b| b.close_price())
            .collect();
        assert_eq!(closes, vec![dec!(3), dec!(4), dec!(5)]);
    }

    #[test]
    fn ring_is_bounded_but_seen_count_is_not() {
        let mut ctx = DataContext::new().with_capacity(Resolution::Day, 2);
        let spy = Instrument::equity("SPY");
        for day in 2..=6 {
            ctx.update(&MarketEvent::from_bar(daily_bar(day, dec!(100)))).unwrap();
        }
        ctx.advance(ts(10));
        assert_eq!(ctx.bars(&spy, Resolution::Day, 10).len(), 2);
        assert_eq!(ctx.bars_seen(&spy, Resolution::Day), 5);
    }

    #[test]
    fn snapshot_tracks_quote_and_trade() {
        let mut ctx = DataContext::new();
        let spy = Instrument::equity("SPY");
        ctx.advance(ts(2));
        ctx.update(&MarketEvent::quote_tick(
            ts(2),
            spy.clone(),
            dec!(99.95),
            dec!(100),
            dec!(100.05),
            dec!(100),
        ))
        .unwrap();
        ctx.update(&MarketEvent::trade_tick(ts(2), spy.clone(), dec!(100.01), dec!(5)))
            .unwrap();

        let snap = ctx.snapshot(&spy);
        assert_eq!(snap.bid, Some(dec!(99.95)));
        assert_eq!(snap.ask, Some(dec!(100.05)));
        assert_eq!(snap.last, Some(dec!(100.01)));
    }

    #[test]
    fn crossed_quote_tick_is_fatal() {
        let mut ctx = DataContext::new();
        let spy = Instrument::equity("SPY");
        let result = ctx.update(&MarketEvent::quote_tick(
            ts(2),
            spy,
            dec!(100.10),
            dec!(100),
            dec!(100.00),
            dec!(100),
        ));
        assert!(matches!(result, Err(DataError::CrossedQuote { .. })));
    }
}
