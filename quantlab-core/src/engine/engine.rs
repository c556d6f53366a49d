//! The run loop.
//!
//! Per tick: due scheduler callbacks fire first, then the data context
//! updates, then each subscribed strategy's pipeline runs for every event
//! that has become visible (market-data latency), then working orders match
//! against the tick's snapshot. The cancellation flag is checked between
//! ticks and the event log is sealed on every exit path.

use crate::calendar::MarketCalendar;
use crate::clock::{ClockError, SimClock};
use crate::costs::{CostEngine, FillDraft};
use crate::data::{DataContext, DataFeed, SubscriptionSet};
use crate::domain::{
    DataError, Fill, IdGen, Instrument, MarketEvent, OrderId, OrderSide, OrderSpec, Resolution,
    StrategyId, TimeInForce,
};
use crate::engine::config::{FaultPolicy, RunConfig};
use crate::events::{EventKind, EventLog, EventLogError, WallSource};
use crate::fills::{stop_touched, FillContext, FillModel};
use crate::latency::LatencyModel;
use crate::ledger::{CashMovementKind, Ledger, LedgerError, ViolationPolicy};
use crate::orders::{OrderManager, StateChange, SubmitCtx};
use crate::rng::SeedHierarchy;
use crate::sched::Scheduler;
use crate::strategy::{AlphaCtx, CapitalAllocation, EqualAllocation, PortfolioCtx, Strategy};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] crate::engine::config::ConfigError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error("data quality: {0}")]
    Data(#[from] DataError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Log(#[from] EventLogError),

    #[error("strategy {strategy} aborted the run: {detail}")]
    StrategyAbort { strategy: StrategyId, detail: String },
}

/// Shared flag for cooperative cancellation; checked between ticks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub fills: u64,
    pub records: u64,
    pub final_cash: Decimal,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineTask {
    SessionClose,
}

struct StrategyRuntime {
    strategy: Strategy,
    universe: BTreeSet<Instrument>,
    universe_date: Option<NaiveDate>,
    capital: Decimal,
    halted: bool,
    /// Events waiting out market-data latency, in arrival order.
    pending: VecDeque<(DateTime<Utc>, MarketEvent)>,
    /// Instruments dropped from the universe while still held; flattened
    /// through the normal order path.
    flatten: BTreeSet<Instrument>,
}

pub struct Engine<W: Write> {
    config: RunConfig,
    calendar: Box<dyn MarketCalendar>,
    clock: SimClock,
    context: DataContext,
    subs: SubscriptionSet,
    runtimes: Vec<StrategyRuntime>,
    manager: OrderManager,
    fill_model: Box<dyn FillModel>,
    costs: CostEngine,
    latency: LatencyModel,
    ledger: Ledger,
    log: EventLog<W>,
    scheduler: Scheduler<EngineTask>,
    fill_ids: IdGen,
    cancel: CancelToken,
    fills_count: u64,
}

impl<W: Write> Engine<W> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RunConfig,
        calendar: Box<dyn MarketCalendar>,
        feeds: Vec<Box<dyn DataFeed>>,
        strategies: Vec<Strategy>,
        fill_model: Box<dyn FillModel>,
        costs: CostEngine,
        sink: W,
        wall: WallSource,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let seeds = SeedHierarchy::new(config.seed);
        let latency = LatencyModel::new(config.latency, &seeds);
        let ledger = Ledger::new(
            config.capital,
            &config.currency,
            config.settlement_mode,
            config.account,
        )
        .with_settlement(config.settlement);

        let ids: Vec<StrategyId> = strategies.iter().map(|s| s.id.clone()).collect();
        let allocations = EqualAllocation.allocate(&ids, config.capital);

        let mut subs = SubscriptionSet::new();
        let mut series: BTreeSet<(Instrument, Resolution)> = BTreeSet::new();
        let runtimes = strategies
            .into_iter()
            .map(|strategy| {
                for (instrument, resolution) in &strategy.subscriptions {
                    subs.add(strategy.id.clone(), instrument.clone(), *resolution);
                    series.insert((instrument.clone(), *resolution));
                }
                let capital = allocations
                    .get(&strategy.id)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                StrategyRuntime {
                    strategy,
                    universe: BTreeSet::new(),
                    universe_date: None,
                    capital,
                    halted: false,
                    pending: VecDeque::new(),
                    flatten: BTreeSet::new(),
                }
            })
            .collect();

        // Announce the consumed series to every provider and pre-load any
        // warm-up history it can serve. The point-in-time guard still
        // applies on read.
        let mut context = DataContext::new().with_bar_price(config.bar_price);
        let mut feeds = feeds;
        for feed in &mut feeds {
            for (instrument, resolution) in &series {
                let _ = feed.subscribe(instrument, *resolution);
                context.preload(feed.warmup(instrument, *resolution, config.start))?;
            }
        }

        let clock = SimClock::new(feeds).with_end(config.end);

        Ok(Self {
            context,
            config,
            calendar,
            clock,
            subs,
            runtimes,
            manager: OrderManager::new(),
            fill_model,
            costs,
            latency,
            ledger,
            log: EventLog::new(sink, wall),
            scheduler: Scheduler::new(),
            fill_ids: IdGen::default(),
            cancel: CancelToken::new(),
            fills_count: 0,
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Register an extra (instrument, resolution) for a strategy. Takes
    /// effect from the next event.
    pub fn add_subscription(
        &mut self,
        strategy: &StrategyId,
        instrument: Instrument,
        resolution: Resolution,
    ) {
        self.subs.add(strategy.clone(), instrument, resolution);
    }

    /// Drop a registration; the strategy stops receiving the series from
    /// the next event.
    pub fn remove_subscription(
        &mut self,
        strategy: &StrategyId,
        instrument: &Instrument,
        resolution: Resolution,
    ) {
        self.subs.remove(strategy, instrument, resolution);
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn manager(&self) -> &OrderManager {
        &self.manager
    }

    /// Consume the engine, returning the log sink.
    pub fn into_log_sink(self) -> W {
        self.log.into_inner()
    }

    /// Run to completion (or cancellation). The log is sealed on every exit
    /// path, including fatal errors.
    pub fn run(&mut self) -> Result<RunSummary, EngineError> {
        let result = self.run_inner();
        let seal = self.log.seal();
        let summary = result?;
        seal?;
        Ok(summary)
    }

    fn run_inner(&mut self) -> Result<RunSummary, EngineError> {
        log::info!(
            "run start: capital={} seed={} strategies={}",
            self.config.capital,
            self.config.seed,
            self.runtimes.len()
        );
        self.log.append(
            self.config.start,
            EventKind::RunStarted {
                seed: self.config.seed,
                capital: self.config.capital,
            },
        )?;

        let mut ticks = 0u64;
        let mut current_date: Option<NaiveDate> = None;
        let mut last_ts = self.config.start;

        loop {
            if self.cancel.is_cancelled() {
                log::info!("run cancelled after {ticks} ticks");
                break;
            }
            let Some(event) = self.clock.next()? else {
                break;
            };
            let now = event.timestamp;
            last_ts = now;

            // Scheduled callbacks fire before the pipeline at the same
            // timestamp, and before any later-dated work.
            let due = self.scheduler.due(now, self.calendar.as_ref());
            for (fire_at, task) in due {
                self.handle_task(fire_at, task)?;
            }

            // Date rollover: settle entries that became effective, arm the
            // new session's close task.
            let date = now.date_naive();
            if current_date != Some(date) {
                self.on_new_date(date, now)?;
                current_date = Some(date);
            }

            self.context.advance(now);
            self.context.update(&event)?;

            // Route to subscribers with market-data latency applied.
            let recipients = self.subs.recipients(&event.instrument, event.resolution);
            if !recipients.is_empty() {
                let visible_at = now + self.latency.market_data.sample();
                for runtime in &mut self.runtimes {
                    if recipients.contains(&runtime.strategy.id) {
                        runtime.pending.push_back((visible_at, event.clone()));
                    }
                }
            }

            self.drain_visible(now)?;
            self.match_orders(&event, now)?;
            ticks += 1;
        }

        // Close out the final session so marks, accruals, and settlement
        // advance for the last trading day.
        let mut final_ts = last_ts;
        if let Some(date) = current_date {
            if let Some(close) = self.calendar.session_close(date) {
                final_ts = close.max(last_ts);
                self.session_close(final_ts)?;
            }
        }

        self.log.append(final_ts, EventKind::RunCompleted { ticks })?;
        log::info!("run complete: {ticks} ticks, {} fills", self.fills_count);

        Ok(RunSummary {
            ticks,
            fills: self.fills_count,
            records: self.log.next_seq(),
            final_cash: self.ledger.account().total(),
            realized_pnl: self.ledger.realized_pnl(),
        })
    }

    fn handle_task(&mut self, fire_at: DateTime<Utc>, task: EngineTask) -> Result<(), EngineError> {
        match task {
            EngineTask::SessionClose => self.session_close(fire_at),
        }
    }

    fn on_new_date(&mut self, date: NaiveDate, now: DateTime<Utc>) -> Result<(), EngineError> {
        for entry in self.ledger.settle_through(date) {
            self.log.append(
                now,
                EventKind::CashMovement {
                    movement: CashMovementKind::Settlement,
                    amount: entry.amount,
                    settled: true,
                    effective: Some(entry.effective),
                },
            )?;
        }
        if let Some(close) = self.calendar.session_close(date) {
            self.scheduler.once(close, 0, EngineTask::SessionClose);
        }
        Ok(())
    }

    /// Daily tasks at session close: expire day orders, accrue borrow and
    /// financing, settle due entries, mark positions to the close reference.
    fn session_close(&mut self, at: DateTime<Utc>) -> Result<(), EngineError> {
        let date = at.date_naive();

        // Market-on-close orders match against the closing snapshot before
        // anything expires.
        let moc: Vec<OrderId> = self
            .manager
            .all_orders()
            .filter(|o| o.spec.tif == TimeInForce::Moc && o.is_working() && o.eligible_at <= at)
            .map(|o| o.id)
            .collect();
        for id in moc {
            self.try_match(id, None, at)?;
        }

        let changes = self.manager.expire_day_orders(at, &mut self.ledger);
        self.log_state_changes(at, &changes)?;

        // Mark positions before accruing so notional-based charges use the
        // session-close reference price.
        let instruments: Vec<Instrument> = self.ledger.positions().keys().cloned().collect();
        for instrument in &instruments {
            let snapshot = self.context.snapshot(instrument);
            if let Some(price) = snapshot.last.or_else(|| snapshot.mid()) {
                self.ledger.mark(instrument, price, at);
                let position = self.ledger.position(instrument).expect("marked position");
                if !position.is_flat() {
                    self.log.append(
                        at,
                        EventKind::PositionUpdated {
                            instrument: instrument.clone(),
                            quantity: position.quantity,
                            avg_entry: position.avg_entry,
                            realized_pnl: position.realized_pnl,
                        },
                    )?;
                }
            }
        }

        for (movement, amount) in self.costs.accrue(self.ledger.positions(), date) {
            self.ledger.post_cash(movement, amount, date);
            self.log.append(
                at,
                EventKind::CashMovement { movement, amount, settled: true, effective: None },
            )?;
        }

        for entry in self.ledger.settle_through(date) {
            self.log.append(
                at,
                EventKind::CashMovement {
                    movement: CashMovementKind::Settlement,
                    amount: entry.amount,
                    settled: true,
                    effective: Some(entry.effective),
                },
            )?;
        }
        Ok(())
    }

    fn log_state_changes(
        &mut self,
        at: DateTime<Utc>,
        changes: &[StateChange],
    ) -> Result<(), EngineError> {
        for change in changes {
            self.log.append(
                at,
                EventKind::OrderStateChanged {
                    order_id: change.order_id,
                    from: change.from,
                    to: change.to,
                    reason: change.reason.clone(),
                },
            )?;
        }
        Ok(())
    }

    /// Run the pipeline for every event that has become visible to each
    /// strategy.
    fn drain_visible(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        for idx in 0..self.runtimes.len() {
            loop {
                let next = {
                    let runtime = &mut self.runtimes[idx];
                    if runtime.halted {
                        runtime.pending.clear();
                        break;
                    }
                    match runtime.pending.front() {
                        Some((visible_at, _)) if *visible_at <= now => {
                            runtime.pending.pop_front().map(|(_, e)| e)
                        }
                        _ => None,
                    }
                };
                let Some(event) = next else { break };
                self.pipeline_for(idx, &event, now)?;
            }
        }
        Ok(())
    }

    fn is_warm(&self, idx: usize) -> bool {
        let runtime = &self.runtimes[idx];
        runtime.strategy.subscriptions.iter().all(|(instrument, resolution)| {
            if *resolution == Resolution::Tick {
                return true;
            }
            let horizon = self.config.warmup.horizon(instrument, *resolution);
            self.context.bars_seen(instrument, *resolution) >= horizon
        })
    }

    /// One strategy, one visible event: universe refresh (daily), alpha,
    /// then — once warm — construction, risk, execution, submission.
    fn pipeline_for(
        &mut self,
        idx: usize,
        event: &MarketEvent,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let date = now.date_naive();

        // Universe refresh, once per trading day. Removals of held
        // instruments queue for flattening through the normal order path.
        if self.runtimes[idx].universe_date != Some(date) {
            let selected = {
                let runtime = &mut self.runtimes[idx];
                runtime.strategy.universe.select(now, &self.context)
            };
            match selected {
                Ok(new_universe) => {
                    let runtime = &mut self.runtimes[idx];
                    for removed in runtime.universe.difference(&new_universe) {
                        runtime.flatten.insert(removed.clone());
                    }
                    runtime.universe = new_universe;
                    runtime.universe_date = Some(date);
                }
                Err(fault) => return self.on_fault(idx, now, fault),
            }
        }

        // Alpha sees data only; its state updates even during warm-up.
        let signals = {
            let runtime = &mut self.runtimes[idx];
            let ctx = AlphaCtx {
                now,
                data: &self.context,
                universe: &runtime.universe,
            };
            match runtime.strategy.alpha.on_event(event, &ctx) {
                Ok(signals) => signals,
                Err(fault) => return self.on_fault(idx, now, fault),
            }
        };

        if !self.is_warm(idx) {
            return Ok(());
        }

        let needs_flatten = {
            let runtime = &mut self.runtimes[idx];
            runtime
                .flatten
                .retain(|i| self.ledger.position_qty(i) != Decimal::ZERO);
            !runtime.flatten.is_empty()
        };
        if signals.is_empty() && !needs_flatten {
            return Ok(());
        }

        // Construction -> risk -> execution over read-only portfolio views.
        let strategy_orders: Vec<crate::domain::Order> = {
            let id = self.runtimes[idx].strategy.id.clone();
            self.manager
                .all_orders()
                .filter(|o| o.strategy == id)
                .cloned()
                .collect()
        };
        let (specs, veto) = {
            let runtime = &mut self.runtimes[idx];
            let ctx = PortfolioCtx {
                now,
                data: &self.context,
                capital: runtime.capital,
                positions: self.ledger.positions(),
                cash: self.ledger.account().total(),
                equity: self.ledger.net_liquidation(),
                orders: &strategy_orders,
            };

            let mut targets = match runtime.strategy.construction.targets(&signals, &ctx) {
                Ok(targets) => targets,
                Err(fault) => return self.on_fault(idx, now, fault),
            };
            for instrument in &runtime.flatten {
                targets.set(instrument.clone(), Decimal::ZERO);
            }

            let pre_risk_len = targets.len();
            let post = match runtime.strategy.risk.apply(targets, &ctx) {
                Ok(post) => post,
                Err(fault) => return self.on_fault(idx, now, fault),
            };
            // Post-risk targets must respect the configured leverage cap.
            if let Err(breach) = post.validate(self.config.leverage_cap) {
                return self.on_fault(idx, now, breach.into());
            }
            let veto = pre_risk_len > 0 && post.is_empty();

            let specs = if veto {
                Vec::new()
            } else {
                match runtime.strategy.execution.orders(&post, &ctx) {
                    Ok(specs) => specs,
                    Err(fault) => return self.on_fault(idx, now, fault),
                }
            };
            (specs, veto)
        };

        if veto {
            let strategy = self.runtimes[idx].strategy.id.clone();
            self.log.append(
                now,
                EventKind::RiskVeto {
                    strategy,
                    detail: "risk model returned empty targets".to_string(),
                },
            )?;
            return Ok(());
        }

        self.submit_specs(idx, specs, now)
    }

    fn submit_specs(
        &mut self,
        idx: usize,
        specs: Vec<OrderSpec>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if specs.is_empty() {
            return Ok(());
        }
        let strategy_id = self.runtimes[idx].strategy.id.clone();

        // Pre-trade violation screening, when escalation is configured.
        let mut accepted_specs = Vec::with_capacity(specs.len());
        for spec in specs {
            if self.config.violation_policy == ViolationPolicy::Reject
                && spec.side == OrderSide::Sell
            {
                if let Some(kind) = self
                    .ledger
                    .pending_sell_violation(&spec.instrument, now.date_naive())
                {
                    log::warn!("pre-trade reject of {} sell: {:?}", spec.instrument, kind);
                    self.log.append(
                        now,
                        EventKind::AccountViolation {
                            violation: kind,
                            instrument: spec.instrument.clone(),
                            detail: "pre-trade reject".to_string(),
                        },
                    )?;
                    continue;
                }
            }
            accepted_specs.push(spec);
        }

        let known: BTreeSet<Instrument> = {
            let runtime = &self.runtimes[idx];
            runtime
                .strategy
                .subscriptions
                .iter()
                .map(|(i, _)| i.clone())
                .chain(runtime.universe.iter().cloned())
                .collect()
        };

        let (outcomes, changes) = {
            let context = &self.context;
            let snapshot_fn = move |i: &Instrument| context.snapshot(i);
            let known_fn = |i: &Instrument| known.contains(i);
            let mut ctx = SubmitCtx {
                now,
                latency: &mut self.latency,
                calendar: self.calendar.as_ref(),
                snapshot: &snapshot_fn,
                known: &known_fn,
            };
            self.manager
                .submit_batch(&strategy_id, accepted_specs, &mut ctx, &mut self.ledger)
        };

        for outcome in &outcomes {
            let order = self.manager.get(&outcome.order_id).expect("submitted order");
            self.log.append(
                now,
                EventKind::OrderSubmitted {
                    order_id: order.id,
                    strategy: order.strategy.clone(),
                    instrument: order.spec.instrument.clone(),
                    side: order.spec.side,
                    size: order.spec.size,
                    order_type: order.spec.order_type,
                    tif: order.spec.tif,
                },
            )?;
        }
        self.log_state_changes(now, &changes)?;
        Ok(())
    }

    fn on_fault(
        &mut self,
        idx: usize,
        now: DateTime<Utc>,
        fault: crate::strategy::StageError,
    ) -> Result<(), EngineError> {
        let strategy_id = self.runtimes[idx].strategy.id.clone();
        let detail = fault.to_string();
        log::warn!("strategy {strategy_id} fault: {detail}");
        self.log.append(
            now,
            EventKind::StrategyFault {
                strategy: strategy_id.clone(),
                detail: detail.clone(),
            },
        )?;

        match self.config.fault_policy {
            FaultPolicy::AbortRun => Err(EngineError::StrategyAbort { strategy: strategy_id, detail }),
            FaultPolicy::HaltStrategy => {
                self.runtimes[idx].halted = true;
                let changes = self.manager.cancel_all_for(&strategy_id, now, &mut self.ledger);
                self.log_state_changes(now, &changes)?;

                // Flatten held instruments the strategy was trading, through
                // the normal order path.
                let held: Vec<(Instrument, Decimal)> = {
                    let runtime = &self.runtimes[idx];
                    runtime
                        .strategy
                        .subscriptions
                        .iter()
                        .map(|(i, _)| i.clone())
                        .filter_map(|i| {
                            let qty = self.ledger.position_qty(&i);
                            (qty != Decimal::ZERO).then_some((i, qty))
                        })
                        .collect()
                };
                let specs: Vec<OrderSpec> = held
                    .into_iter()
                    .map(|(instrument, qty)| {
                        let side = if qty > Decimal::ZERO { OrderSide::Sell } else { OrderSide::Buy };
                        OrderSpec::market(instrument, side, qty.abs())
                    })
                    .collect();
                self.submit_specs(idx, specs, now)
            }
        }
    }

    /// Walk working orders in submission order against the tick's snapshots.
    fn match_orders(&mut self, event: &MarketEvent, now: DateTime<Utc>) -> Result<(), EngineError> {
        let working = self.manager.working_order_ids();
        let mut attempted = Vec::new();

        for id in working {
            if self.try_match(id, Some(event), now)? {
                attempted.push(id);
            }
        }

        let changes = self.manager.expire_ioc(&attempted, now, &mut self.ledger);
        self.log_state_changes(now, &changes)?;
        Ok(())
    }

    /// One order against the current snapshot. Returns whether a matching
    /// attempt was made (the order was working and eligible).
    fn try_match(
        &mut self,
        id: OrderId,
        event: Option<&MarketEvent>,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let Some(order) = self.manager.get(&id) else {
            return Ok(false);
        };
        if !order.is_working() || order.eligible_at > now {
            return Ok(false);
        }
        let instrument = order.spec.instrument.clone();
        let snapshot = self.context.snapshot(&instrument);

        // Stop triggers latch before the model is consulted.
        if order.spec.order_type.requires_trigger()
            && !order.triggered
            && stop_touched(order, &snapshot)
        {
            self.manager.note_trigger(id);
        }

        let order = self.manager.get(&id).expect("order present").clone();
        let ctx = FillContext { now, snapshot: &snapshot, event };
        let proposals = self.fill_model.propose(&order, &ctx);

        if proposals.is_empty() {
            return Ok(true);
        }

        // Fill-or-kill: anything short of the full remainder kills the order
        // without filling.
        let proposed_total: Decimal = proposals.iter().map(|p| p.size).sum();
        if order.spec.tif == TimeInForce::Fok && proposed_total < order.remaining_qty() {
            let changes = self.manager.cancel(id, now, &mut self.ledger);
            self.log_state_changes(now, &changes)?;
            return Ok(true);
        }

        for proposal in proposals {
            if proposal.size <= Decimal::ZERO {
                continue;
            }
            self.apply_proposal(&order.spec.instrument, id, proposal, &snapshot, now)?;
        }
        Ok(true)
    }

    fn apply_proposal(
        &mut self,
        instrument: &Instrument,
        id: crate::domain::OrderId,
        proposal: crate::fills::FillProposal,
        snapshot: &crate::domain::MarketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let Some(order) = self.manager.get(&id) else {
            return Ok(());
        };
        if !order.is_working() {
            return Ok(());
        }
        let size = proposal.size.min(order.remaining_qty());
        let side = order.spec.side;
        let arrival = order.arrival_price;

        let draft = FillDraft {
            instrument: instrument.clone(),
            side,
            price: proposal.price,
            size,
            snapshot: snapshot.clone(),
            arrival_price: arrival,
        };
        let price = self.costs.adjusted_price(&draft);
        let costed_draft = FillDraft { price, ..draft };
        let commission = self
            .costs
            .commission(&costed_draft, self.ledger.position(instrument));
        let slippage = arrival
            .map(|a| (price - a) * side.sign())
            .unwrap_or(Decimal::ZERO);

        let fill = Fill {
            id: self.fill_ids.next_fill(),
            order_id: id,
            timestamp: now,
            instrument: instrument.clone(),
            side,
            price,
            size,
            commission,
            slippage,
            snapshot: snapshot.clone(),
        };

        // Ledger first: a reconciliation failure is fatal before any order
        // state mutates.
        let update = self.ledger.apply_fill(&fill, self.calendar.as_ref())?;

        let changes = {
            let context = &self.context;
            let snapshot_fn = move |i: &Instrument| context.snapshot(i);
            let known_fn = |_: &Instrument| true;
            let mut ctx = SubmitCtx {
                now,
                latency: &mut self.latency,
                calendar: self.calendar.as_ref(),
                snapshot: &snapshot_fn,
                known: &known_fn,
            };
            self.manager.on_fill(&fill, &mut ctx, &mut self.ledger)
        };

        self.fills_count += 1;
        self.log.append(now, EventKind::OrderFilled { fill })?;
        self.log.append(
            now,
            EventKind::CashMovement {
                movement: CashMovementKind::Trade,
                amount: update.cash_amount,
                settled: update.cash_settled,
                effective: update.effective,
            },
        )?;
        if let Some(position) = self.ledger.position(instrument) {
            self.log.append(
                now,
                EventKind::PositionUpdated {
                    instrument: instrument.clone(),
                    quantity: position.quantity,
                    avg_entry: position.avg_entry,
                    realized_pnl: position.realized_pnl,
                },
            )?;
        }
        if let Some(kind) = update.violation {
            log::warn!("{kind:?} violation on {instrument}");
            self.log.append(
                now,
                EventKind::AccountViolation {
                    violation: kind,
                    instrument: instrument.clone(),
                    detail: "unsettled funds".to_string(),
                },
            )?;
        }
        self.log_state_changes(now, &changes)?;
        Ok(())
    }
}
