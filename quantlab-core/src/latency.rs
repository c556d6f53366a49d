//! Latency simulation: three independent delay streams (order transmission,
//! market-data dissemination, venue-side execution), each a seeded
//! distribution. Market-data latency shifts strategy visibility only; it
//! never reorders events on the clock.

use crate::rng::SeedHierarchy;
use chrono::Duration;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Delay distribution, parameterised in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DelayDistribution {
    Fixed { millis: f64 },
    Uniform { lo: f64, hi: f64 },
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Exponential { mean: f64 },
}

impl DelayDistribution {
    pub fn zero() -> Self {
        DelayDistribution::Fixed { millis: 0.0 }
    }

    fn sample_millis(&self, rng: &mut ChaCha8Rng) -> f64 {
        match *self {
            DelayDistribution::Fixed { millis } => millis,
            DelayDistribution::Uniform { lo, hi } => {
                if hi <= lo {
                    lo
                } else {
                    rng.gen_range(lo..hi)
                }
            }
            DelayDistribution::Normal { mean, std_dev } => {
                mean + std_dev * standard_normal(rng)
            }
            DelayDistribution::LogNormal { mu, sigma } => {
                (mu + sigma * standard_normal(rng)).exp()
            }
            DelayDistribution::Exponential { mean } => {
                // Inverse CDF over a uniform in (0, 1].
                let u: f64 = 1.0 - rng.gen::<f64>();
                -mean * u.ln()
            }
        }
    }
}

/// Box-Muller transform; two uniforms in, one standard normal out.
fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// One seeded delay stream.
#[derive(Debug, Clone)]
pub struct DelayStream {
    distribution: DelayDistribution,
    rng: ChaCha8Rng,
}

impl DelayStream {
    pub fn new(distribution: DelayDistribution, rng: ChaCha8Rng) -> Self {
        Self { distribution, rng }
    }

    /// Sample a non-negative delay. Negative draws clamp to zero.
    pub fn sample(&mut self) -> Duration {
        let millis = self.distribution.sample_millis(&mut self.rng).max(0.0);
        Duration::microseconds((millis * 1_000.0).round() as i64)
    }
}

/// Configuration for the three streams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyConfig {
    pub transmission: DelayDistribution,
    pub market_data: DelayDistribution,
    pub execution: DelayDistribution,
}

impl LatencyConfig {
    /// Zero latency everywhere; the default for frictionless backtests.
    pub fn zero() -> Self {
        Self {
            transmission: DelayDistribution::zero(),
            market_data: DelayDistribution::zero(),
            execution: DelayDistribution::zero(),
        }
    }
}

/// The three delay streams, each with its own child-seeded generator so the
/// streams are independent and individually reproducible.
#[derive(Debug, Clone)]
pub struct LatencyModel {
    pub transmission: DelayStream,
    pub market_data: DelayStream,
    pub execution: DelayStream,
}

impl LatencyModel {
    pub fn new(config: LatencyConfig, seeds: &SeedHierarchy) -> Self {
        Self {
            transmission: DelayStream::new(config.transmission, seeds.rng("latency/transmission")),
            market_data: DelayStream::new(config.market_data, seeds.rng("latency/market_data")),
            execution: DelayStream::new(config.execution, seeds.rng("latency/execution")),
        }
    }

    pub fn zero(seeds: &SeedHierarchy) -> Self {
        Self::new(LatencyConfig::zero(), seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> SeedHierarchy {
        SeedHierarchy::new(42)
    }

    #[test]
    fn fixed_delay_is_constant() {
        let mut stream = DelayStream::new(
            DelayDistribution::Fixed { millis: 250.0 },
            seeds().rng("latency/transmission"),
        );
        assert_eq!(stream.sample(), Duration::milliseconds(250));
        assert_eq!(stream.sample(), Duration::milliseconds(250));
    }

    #[test]
    fn uniform_delay_stays_in_range() {
        let mut stream = DelayStream::new(
            DelayDistribution::Uniform { lo: 10.0, hi: 20.0 },
            seeds().rng("latency/transmission"),
        );
        for _ in 0..100 {
            let d = stream.sample();
            assert!(d >= Duration::milliseconds(10) && d < Duration::milliseconds(20));
        }
    }

    #[test]
    fn samples_are_never_negative() {
        let mut stream = DelayStream::new(
            DelayDistribution::Normal { mean: 0.0, std_dev: 50.0 },
            seeds().rng("latency/execution"),
        );
        for _ in 0..200 {
            assert!(stream.sample() >= Duration::zero());
        }
    }

    #[test]
    fn same_seed_same_stream() {
        let config = LatencyConfig {
            transmission: DelayDistribution::Exponential { mean: 30.0 },
            market_data: DelayDistribution::LogNormal { mu: 2.0, sigma: 0.5 },
            execution: DelayDistribution::Uniform { lo: 1.0, hi: 5.0 },
        };
        let mut a = LatencyModel::new(config, &seeds());
        let mut b = LatencyModel::new(config, &seeds());
        for _ in 0..50 {
            assert_eq!(a.transmission.sample(), b.transmission.sample());
            assert_eq!(a.market_data.sample(), b.market_data.sample());
            assert_eq!(a.execution.sample(), b.execution.sample());
        }
    }

    #[test]
    fn streams_are_independent() {
        let config = LatencyConfig {
            transmission: DelayDistribution::Uniform { lo: 0.0, hi: 100.0 },
            market_data: DelayDistribution::Uniform { lo: 0.0, hi: 100.0 },
            execution: DelayDistribution::Uniform { lo: 0.0, hi: 100.0 },
        };
        let mut model = LatencyModel::new(config, &seeds());
        // Different child seeds: overwhelmingly unlikely to coincide.
        let t = model.transmission.sample();
        let m = model.market_data.sample();
        assert_ne!(t, m);
    }
}
