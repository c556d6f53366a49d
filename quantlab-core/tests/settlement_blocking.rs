//! Realistic T+2 settlement blocks spending of unsettled proceeds.
//!
//! Cash account, 100 capital. The opening buy consumes all settled cash
//! (effective T+2), the next-day sell leaves only pending proceeds, and a
//! buy attempted before those proceeds settle is rejected for insufficient
//! buying power. The same order accepts once settlement lands.

use chrono::{NaiveDate, TimeZone, Utc};
use quantlab_core::calendar::WeekdayCalendar;
use quantlab_core::costs::CostEngine;
use quantlab_core::data::VecFeed;
use quantlab_core::domain::{
    Instrument, MarketEvent, OrderSide, OrderSpec, OrderState, RejectReason, Resolution, Signal,
    StrategyId, TargetPortfolio,
};
use quantlab_core::engine::{Engine, RunConfig};
use quantlab_core::events::{read_records, EventKind, WallSource};
use quantlab_core::fills::InstantFill;
use quantlab_core::ledger::{CashMovementKind, SettlementMode};
use quantlab_core::strategy::{
    AlphaCtx, AlphaModel, ExecutionModel, NoRisk, PortfolioConstruction, PortfolioCtx, StageError,
    StaticUniverse, Strategy,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

struct Pulse;

impl AlphaModel for Pulse {
    fn on_event(&mut self, event: &MarketEvent, ctx: &AlphaCtx) -> Result<Vec<Signal>, StageError> {
        Ok(vec![Signal::new(
            event.instrument.clone(),
            Decimal::ZERO,
            Decimal::ONE,
            ctx.now,
        )])
    }
}

struct NoTargets;

impl PortfolioConstruction for NoTargets {
    fn targets(
        &mut self,
        _signals: &[Signal],
        _ctx: &PortfolioCtx,
    ) -> Result<TargetPortfolio, StageError> {
        Ok(TargetPortfolio::new())
    }
}

/// Emits a scripted batch of specs the first time the pipeline runs on each
/// date.
struct DateScript {
    script: BTreeMap<NaiveDate, Vec<OrderSpec>>,
}

impl ExecutionModel for DateScript {
    fn orders(
        &mut self,
        _targets: &TargetPortfolio,
        ctx: &PortfolioCtx,
    ) -> Result<Vec<OrderSpec>, StageError> {
        Ok(self.script.remove(&ctx.now.date_naive()).unwrap_or_default())
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

#[test]
fn unsettled_proceeds_block_purchases_until_t_plus_2() {
    let spy = Instrument::equity("SPY");

    // One trade print per day, Mon Jan 1 through Thu Jan 4, all at 10.00.
    let feed = VecFeed::new((1..=4).map(|day| {
        MarketEvent::trade_tick(
            Utc.with_ymd_and_hms(2024, 1, day, 15, 0, 0).unwrap(),
            spy.clone(),
            dec!(10),
            dec!(1000),
        )
    }));

    let script = BTreeMap::from([
        // Mon: spend the full 100 of settled capital (settles Wed).
        (d(1), vec![OrderSpec::market(spy.clone(), OrderSide::Buy, dec!(10))]),
        // Tue: sell everything; proceeds 100 settle Thu.
        (d(2), vec![OrderSpec::market(spy.clone(), OrderSide::Sell, dec!(10))]),
        // Wed: buy outflow has settled (0 settled cash left): reject.
        (d(3), vec![OrderSpec::market(spy.clone(), OrderSide::Buy, dec!(8))]),
        // Thu: proceeds settled: accept.
        (d(4), vec![OrderSpec::market(spy.clone(), OrderSide::Buy, dec!(8))]),
    ]);

    let strategy = Strategy {
        id: StrategyId::new("settlement"),
        universe: Box::new(StaticUniverse::new([spy.clone()])),
        alpha: Box::new(Pulse),
        construction: Box::new(NoTargets),
        risk: Box::new(NoRisk),
        execution: Box::new(DateScript { script }),
        subscriptions: vec![(spy.clone(), Resolution::Tick)],
    };

    let config = RunConfig::backtest(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap(),
        dec!(100),
    )
    .with_settlement(SettlementMode::Realistic);

    let mut engine = Engine::new(
        config,
        Box::new(WeekdayCalendar::full_day()),
        vec![Box::new(feed)],
        vec![strategy],
        Box::new(InstantFill::new()),
        CostEngine::frictionless(),
        Vec::new(),
        WallSource::Fixed(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
    )
    .unwrap();

    engine.run().unwrap();

    let bytes = engine.into_log_sink();
    let records = read_records(&bytes[..]).unwrap();

    // Wednesday's buy was rejected for buying power.
    let rejection = records
        .iter()
        .find(|r| {
            matches!(
                &r.event,
                EventKind::OrderStateChanged { to: OrderState::Rejected, reason: Some(reason), .. }
                    if reason == &RejectReason::InsufficientBuyingPower.to_string()
            )
        })
        .expect("a buying-power rejection");
    assert_eq!(rejection.clock_ts.date_naive(), d(3));

    // Thursday's identical buy filled.
    let thursday_fill = records
        .iter()
        .filter_map(|r| match &r.event {
            EventKind::OrderFilled { fill } => Some(fill),
            _ => None,
        })
        .find(|f| f.timestamp.date_naive() == d(4) && f.side == OrderSide::Buy);
    assert!(thursday_fill.is_some());

    // Settlement log entries carry the business-day effective dates.
    let settlements: Vec<NaiveDate> = records
        .iter()
        .filter_map(|r| match &r.event {
            EventKind::CashMovement { movement, effective, .. }
                if *movement == CashMovementKind::Settlement =>
            {
                *effective
            }
            _ => None,
        })
        .collect();
    // Monday's buy settles Wednesday; Tuesday's sell settles Thursday.
    assert!(settlements.contains(&d(3)));
    assert!(settlements.contains(&d(4)));
}
