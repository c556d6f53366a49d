//! Alpha model implementations. Indicator state is local to the model and
//! updated from the events it receives; there is no shared indicator
//! registry.

use super::{AlphaCtx, AlphaModel, StageError};
use crate::domain::{Instrument, MarketEvent, MarketPayload, Signal};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Moving-average crossover: long when the fast average crosses above the
/// slow, flat (or short, per construction policy) when it crosses below.
pub struct MaCrossoverAlpha {
    fast: usize,
    slow: usize,
    closes: HashMap<Instrument, VecDeque<Decimal>>,
    previous: HashMap<Instrument, (Decimal, Decimal)>,
}

impl MaCrossoverAlpha {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast < slow, "fast period must be shorter than slow");
        Self {
            fast,
            slow,
            closes: HashMap::new(),
            previous: HashMap::new(),
        }
    }

    fn mean(window: &VecDeque<Decimal>, period: usize) -> Decimal {
        let sum: Decimal = window.iter().rev().take(period).sum();
        sum / Decimal::from(period as u64)
    }
}

impl AlphaModel for MaCrossoverAlpha {
    fn on_event(&mut self, event: &MarketEvent, ctx: &AlphaCtx) -> Result<Vec<Signal>, StageError> {
        let MarketPayload::Bar(bar) = &event.payload else {
            return Ok(Vec::new());
        };
        if !ctx.universe.contains(&event.instrument) {
            return Ok(Vec::new());
        }

        let closes = self.closes.entry(event.instrument.clone()).or_default();
        closes.push_back(bar.close_price());
        while closes.len() > self.slow {
            closes.pop_front();
        }
        if closes.len() < self.slow {
            return Ok(Vec::new());
        }

        let fast_ma = Self::mean(closes, self.fast);
        let slow_ma = Self::mean(closes, self.slow);
        let previous = self.previous.insert(event.instrument.clone(), (fast_ma, slow_ma));

        let Some((prev_fast, prev_slow)) = previous else {
            // First bar with both averages defined: no cross yet.
            return Ok(Vec::new());
        };

        let crossed_above = prev_fast <= prev_slow && fast_ma > slow_ma;
        let crossed_below = prev_fast >= prev_slow && fast_ma < slow_ma;
        let strength = if crossed_above {
            Decimal::ONE
        } else if crossed_below {
            -Decimal::ONE
        } else {
            return Ok(Vec::new());
        };

        Ok(vec![Signal::new(
            event.instrument.clone(),
            strength,
            Decimal::ONE,
            ctx.now,
        )])
    }
}
