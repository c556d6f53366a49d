//! Criterion benchmarks for the engine hot paths.
//!
//! Benchmarks:
//! 1. Full run loop over a year of daily bars
//! 2. Order submission and fill application through the order manager
//! 3. Data context ingestion

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chrono::{NaiveDate, TimeZone, Utc};
use quantlab_core::calendar::WeekdayCalendar;
use quantlab_core::costs::CostEngine;
use quantlab_core::data::{DataContext, VecFeed};
use quantlab_core::domain::{Instrument, MarketEvent, Resolution, StrategyId};
use quantlab_core::engine::{Engine, RunConfig};
use quantlab_core::events::WallSource;
use quantlab_core::fills::SpreadAwareFill;
use quantlab_core::strategy::{
    EqualWeightConstruction, ImmediateExecution, MaCrossoverAlpha, NoRisk, StaticUniverse,
    Strategy,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn closes(n: usize) -> Vec<Decimal> {
    (0..n)
        .map(|i| {
            let wave = ((i as f64 * 0.1).sin() * 1000.0) as i64;
            dec!(100) + Decimal::from(wave) / dec!(100)
        })
        .collect()
}

fn bench_run_loop(c: &mut Criterion) {
    c.bench_function("run_loop_daily_year", |b| {
        b.iter(|| {
            let spy = Instrument::equity("SPY");
            let feed = VecFeed::from_daily_closes(
                spy.clone(),
                NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
                &closes(252),
            );
            let strategy = Strategy {
                id: StrategyId::new("bench"),
                universe: Box::new(StaticUniverse::new([spy.clone()])),
                alpha: Box::new(MaCrossoverAlpha::new(10, 30)),
                construction: Box::new(EqualWeightConstruction::long_only(dec!(0.9))),
                risk: Box::new(NoRisk),
                execution: Box::new(ImmediateExecution),
                subscriptions: vec![(spy.clone(), Resolution::Day)],
            };
            let config = RunConfig::backtest(
                Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                dec!(100000),
            );
            let mut engine = Engine::new(
                config,
                Box::new(WeekdayCalendar::full_day()),
                vec![Box::new(feed)],
                vec![strategy],
                Box::new(SpreadAwareFill::new(Decimal::ZERO)),
                CostEngine::frictionless(),
                Vec::new(),
                WallSource::Fixed(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            )
            .unwrap();
            black_box(engine.run().unwrap())
        })
    });
}

fn bench_context_ingest(c: &mut Criterion) {
    let spy = Instrument::equity("SPY");
    let events: Vec<MarketEvent> = (0..10_000u32)
        .map(|i| {
            MarketEvent::trade_tick(
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
                    + chrono::Duration::seconds(i as i64),
                spy.clone(),
                dec!(100) + Decimal::from(i % 100) / dec!(100),
                dec!(100),
            )
        })
        .collect();

    c.bench_function("context_ingest_10k_ticks", |b| {
        b.iter(|| {
            let mut context = DataContext::new();
            for event in &events {
                context.advance(event.timestamp);
                context.update(black_box(event)).unwrap();
            }
            black_box(context.snapshot(&spy))
        })
    });
}

criterion_group!(benches, bench_run_loop, bench_context_ingest);
criterion_main!(benches);
