//! Market data payloads: aggregated bars, ticks, and the event envelope.

use crate::domain::instrument::{Instrument, Resolution};
use crate::domain::order::OrderSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trade-aggregated OHLCV fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeBar {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Quote-aggregated bid/ask OHLC fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteBar {
    pub bid_open: Decimal,
    pub bid_high: Decimal,
    pub bid_low: Decimal,
    pub bid_close: Decimal,
    pub ask_open: Decimal,
    pub ask_high: Decimal,
    pub ask_low: Decimal,
    pub ask_close: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BarData {
    Trade(TradeBar),
    Quote(QuoteBar),
}

/// A single aggregated bar. `start` marks the beginning of the interval; the
/// bar carries completed information only at `start + interval`, which is
/// the timestamp the clock delivers it under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub start: DateTime<Utc>,
    pub instrument: Instrument,
    pub resolution: Resolution,
    pub data: BarData,
}

impl Bar {
    pub fn trade(
        start: DateTime<Utc>,
        instrument: Instrument,
        resolution: Resolution,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            start,
            instrument,
            resolution,
            data: BarData::Trade(TradeBar { open, high, low, close, volume }),
        }
    }

    /// The moment this bar becomes knowable.
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.start + self.resolution.interval()
    }

    /// Closing reference price: trade close, or quote mid at close.
    pub fn close_price(&self) -> Decimal {
        match &self.data {
            BarData::Trade(t) => t.close,
            BarData::Quote(q) => (q.bid_close + q.ask_close) / Decimal::TWO,
        }
    }

    /// Opening reference price: trade open, or quote mid at open.
    pub fn open_price(&self) -> Decimal {
        match &self.data {
            BarData::Trade(t) => t.open,
            BarData::Quote(q) => (q.bid_open + q.ask_open) / Decimal::TWO,
        }
    }

    /// Validate bar invariants. Violations are data-quality errors and fatal
    /// to the run; cleaning belongs upstream of the engine.
    pub fn validate(&self) -> Result<(), DataError> {
        match &self.data {
            BarData::Trade(t) => {
                if t.high < t.low {
                    return Err(DataError::InvalidRange { high: t.high, low: t.low });
                }
                if t.open < Decimal::ZERO
                    || t.high < Decimal::ZERO
                    || t.low < Decimal::ZERO
                    || t.close < Decimal::ZERO
                {
                    return Err(DataError::NegativePrice);
                }
                if t.volume < Decimal::ZERO {
                    return Err(DataError::NegativeVolume);
                }
                if t.open < t.low || t.open > t.high {
                    return Err(DataError::OpenOutOfRange);
                }
                if t.close < t.low || t.close > t.high {
                    return Err(DataError::CloseOutOfRange);
                }
            }
            BarData::Quote(q) => {
                if q.bid_close > q.ask_close {
                    return Err(DataError::CrossedQuote {
                        bid: q.bid_close,
                        ask: q.ask_close,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A single trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub price: Decimal,
    pub size: Decimal,
    /// Aggressor side, when the venue reports it.
    pub aggressor: Option<OrderSide>,
}

/// A top-of-book quote update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteTick {
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
}

/// One side of an L2 depth snapshot, best level first.
pub type DepthLevels = Vec<(Decimal, Decimal)>;

/// An L2 order book snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub bids: DepthLevels,
    pub asks: DepthLevels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketPayload {
    Bar(Bar),
    Trade(TradeTick),
    Quote(QuoteTick),
    Depth(DepthSnapshot),
}

/// The event envelope delivered by the clock. `timestamp` is the effective
/// moment of the payload (for bars, interval start + duration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub timestamp: DateTime<Utc>,
    pub instrument: Instrument,
    pub resolution: Resolution,
    pub payload: MarketPayload,
}

impl MarketEvent {
    pub fn from_bar(bar: Bar) -> Self {
        Self {
            timestamp: bar.effective_at(),
            instrument: bar.instrument.clone(),
            resolution: bar.resolution,
            payload: MarketPayload::Bar(bar),
        }
    }

    pub fn trade_tick(
        timestamp: DateTime<Utc>,
        instrument: Instrument,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self {
            timestamp,
            instrument,
            resolution: Resolution::Tick,
            payload: MarketPayload::Trade(TradeTick { price, size, aggressor: None }),
        }
    }

    pub fn quote_tick(
        timestamp: DateTime<Utc>,
        instrument: Instrument,
        bid: Decimal,
        bid_size: Decimal,
        ask: Decimal,
        ask_size: Decimal,
    ) -> Self {
        Self {
            timestamp,
            instrument,
            resolution: Resolution::Tick,
            payload: MarketPayload::Quote(QuoteTick { bid, bid_size, ask, ask_size }),
        }
    }
}

#[derive(Debug, Error)]
pub enum DataError {
    #[error("invalid bar range: high={high}, low={low}")]
    InvalidRange { high: Decimal, low: Decimal },

    #[error("negative price not allowed")]
    NegativePrice,

    #[error("negative volume not allowed")]
    NegativeVolume,

    #[error("open price outside high/low range")]
    OpenOutOfRange,

    #[error("close price outside high/low range")]
    CloseOutOfRange,

    #[error("crossed quote: bid={bid} > ask={ask}")]
    CrossedQuote { bid: Decimal, ask: Decimal },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, 0, 0).unwrap()
    }

    #[test]
    fn bar_effective_at_end_of_interval() {
        let bar = Bar::trade(
            ts(14),
            Instrument::equity("SPY"),
            Resolution::Hour,
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100.5),
            dec!(1000),
        );
        assert_eq!(bar.effective_at(), ts(15));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let bar = Bar::trade(
            ts(14),
            Instrument::equity("SPY"),
            Resolution::Hour,
            dec!(100),
            dec!(99),
            dec!(101),
            dec!(100),
            dec!(1000),
        );
        assert!(matches!(bar.validate(), Err(DataError::InvalidRange { .. })));
    }

    #[test]
    fn validate_rejects_close_outside_range() {
        let bar = Bar::trade(
            ts(14),
            Instrument::equity("SPY"),
            Resolution::Hour,
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(102),
            dec!(1000),
        );
        assert!(matches!(bar.validate(), Err(DataError::CloseOutOfRange)));
    }

    #[test]
    fn validate_rejects_crossed_quote_bar() {
        let bar = Bar {
            start: ts(14),
            instrument: Instrument::equity("SPY"),
            resolution: Resolution::Hour,
            data: BarData::Quote(QuoteBar {
                bid_open: dec!(100),
                bid_high: dec!(101),
                bid_low: dec!(99),
                bid_close: dec!(100.10),
                ask_open: dec!(100.05),
                ask_high: dec!(101.05),
                ask_low: dec!(99.05),
                ask_close: dec!(100.05),
            }),
        };
        assert!(matches!(bar.validate(), Err(DataError::CrossedQuote { .. })));
    }

    #[test]
    fn quote_bar_close_price_is_mid() {
        let bar = Bar {
            start: ts(14),
            instrument: Instrument::equity("SPY"),
            resolution: Resolution::Hour,
            data: BarData::Quote(QuoteBar {
                bid_open: dec!(100),
                bid_high: dec!(101),
                bid_low: dec!(99),
                bid_close: dec!(100.00),
                ask_open: dec!(100.10),
                ask_high: dec!(101.10),
                ask_low: dec!(99.10),
                ask_close: dec!(100.10),
            }),
        };
        assert_eq!(bar.close_price(), dec!(100.05));
    }
}
