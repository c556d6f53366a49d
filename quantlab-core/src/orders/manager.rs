//! The order manager.
//!
//! Owns every order after submission. Validates specs, checks buying power
//! and reserves cash for working buys, applies the latency gate, resolves
//! OCO and bracket groups, and drives all state transitions. Fills cancel
//! OCO siblings and promote bracket children within the same tick.

use crate::calendar::MarketCalendar;
use crate::domain::{
    Fill, GroupRole, Instrument, LinkKind, MarketSnapshot, Order, OrderId, OrderSide, OrderSpec,
    OrderState, OrderType, RejectReason, StrategyId, TimeInForce,
};
use crate::latency::LatencyModel;
use crate::ledger::Ledger;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// A state transition, reported for the event log.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub order_id: OrderId,
    pub from: OrderState,
    pub to: OrderState,
    pub reason: Option<String>,
}

/// Result of submitting one spec.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub order_id: OrderId,
    pub result: Result<(), RejectReason>,
}

/// Per-call context for submission.
pub struct SubmitCtx<'a> {
    pub now: DateTime<Utc>,
    pub latency: &'a mut LatencyModel,
    pub calendar: &'a dyn MarketCalendar,
    pub snapshot: &'a dyn Fn(&Instrument) -> MarketSnapshot,
    pub known: &'a dyn Fn(&Instrument) -> bool,
}

pub struct OrderManager {
    orders: BTreeMap<OrderId, Order>,
    /// Submission sequence; fill matching walks orders in this order.
    sequence: Vec<OrderId>,
    /// Cash reserved per working buy order.
    reserved: HashMap<OrderId, Decimal>,
    next_id: u64,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            orders: BTreeMap::new(),
            sequence: Vec::new(),
            reserved: HashMap::new(),
            next_id: 0,
        }
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.sequence.iter().filter_map(|id| self.orders.get(id))
    }

    /// Working orders in submission order, the tie-break for same-tick fills.
    pub fn working_order_ids(&self) -> Vec<OrderId> {
        self.sequence
            .iter()
            .filter(|id| self.orders.get(id).is_some_and(|o| o.is_working()))
            .copied()
            .collect()
    }

    pub fn open_order_count(&self) -> usize {
        self.orders.values().filter(|o| !o.is_terminal()).count()
    }

    fn next_order_id(&mut self) -> OrderId {
        self.next_id += 1;
        OrderId(self.next_id)
    }

    fn validate(spec: &OrderSpec, known: &dyn Fn(&Instrument) -> bool) -> Result<(), RejectReason> {
        if spec.size <= Decimal::ZERO {
            return Err(RejectReason::Validation(format!(
                "order size {} must be positive",
                spec.size
            )));
        }
        if let Some(limit) = spec.order_type.limit_price() {
            if limit <= Decimal::ZERO {
                return Err(RejectReason::Validation(format!(
                    "limit price {limit} must be positive"
                )));
            }
        }
        if let Some(stop) = spec.order_type.stop_price() {
            if stop <= Decimal::ZERO {
                return Err(RejectReason::Validation(format!(
                    "stop price {stop} must be positive"
                )));
            }
        }
        if !known(&spec.instrument) {
            return Err(RejectReason::Validation(format!(
                "unknown instrument {}",
                spec.instrument
            )));
        }
        Ok(())
    }

    /// Conservative cost estimate used for the buying-power check and the
    /// cash reservation: the limit price when present, else the snapshot
    /// reference price.
    fn estimated_cost(spec: &OrderSpec, snapshot: &MarketSnapshot) -> Option<Decimal> {
        let price = spec
            .order_type
            .limit_price()
            .or(spec.order_type.stop_price())
            .or_else(|| snapshot.ask.or_else(|| snapshot.arrival_price()))?;
        Some(price * spec.size)
    }

    /// Submit a batch of specs from one strategy. Group tags resolve within
    /// the batch: OCO members become mutual siblings; bracket children hang
    /// off their entry and stay `Pending` until it fills.
    pub fn submit_batch(
        &mut self,
        strategy: &StrategyId,
        specs: Vec<OrderSpec>,
        ctx: &mut SubmitCtx,
        ledger: &mut Ledger,
    ) -> (Vec<SubmitOutcome>, Vec<StateChange>) {
        let mut outcomes = Vec::new();
        let mut changes = Vec::new();
        let mut groups: BTreeMap<u32, Vec<(OrderId, LinkKind, GroupRole)>> = BTreeMap::new();

        for spec in specs {
            let id = self.next_order_id();
            let mut order = Order::new(id, strategy.clone(), spec, ctx.now);

            if let Err(reason) = Self::validate(&order.spec, ctx.known) {
                order.reject(reason.clone(), ctx.now);
                changes.push(StateChange {
                    order_id: id,
                    from: OrderState::Pending,
                    to: OrderState::Rejected,
                    reason: Some(reason.to_string()),
                });
                self.orders.insert(id, order);
                self.sequence.push(id);
                outcomes.push(SubmitOutcome { order_id: id, result: Err(reason) });
                continue;
            }

            let is_bracket_child = matches!(
                order.spec.link,
                Some(link) if link.kind == LinkKind::Bracket
                    && link.role != GroupRole::Entry
            );

            if let Some(link) = order.spec.link {
                groups.entry(link.group).or_default().push((id, link.kind, link.role));
            }

            if is_bracket_child {
                // Stays Pending; activates when the entry fills.
                self.orders.insert(id, order);
                self.sequence.push(id);
                outcomes.push(SubmitOutcome { order_id: id, result: Ok(()) });
                continue;
            }

            let snapshot = (ctx.snapshot)(&order.spec.instrument);

            // Buying-power gate applies to buys; the reservation holds the
            // estimated cost until the order terminates.
            if order.spec.side == OrderSide::Buy {
                let Some(cost) = Self::estimated_cost(&order.spec, &snapshot) else {
                    let reason = RejectReason::Validation("no reference price".to_string());
                    order.reject(reason.clone(), ctx.now);
                    changes.push(StateChange {
                        order_id: id,
                        from: OrderState::Pending,
                        to: OrderState::Rejected,
                        reason: Some(reason.to_string()),
                    });
                    self.orders.insert(id, order);
                    self.sequence.push(id);
                    outcomes.push(SubmitOutcome { order_id: id, result: Err(reason) });
                    continue;
                };
                if cost > ledger.buying_power() {
                    let reason = RejectReason::InsufficientBuyingPower;
                    order.reject(reason.clone(), ctx.now);
                    changes.push(StateChange {
                        order_id: id,
                        from: OrderState::Pending,
                        to: OrderState::Rejected,
                        reason: Some(reason.to_string()),
                    });
                    self.orders.insert(id, order);
                    self.sequence.push(id);
                    outcomes.push(SubmitOutcome { order_id: id, result: Err(reason) });
                    continue;
                }
                ledger.reserve(cost);
                self.reserved.insert(id, cost);
            }

            changes.extend(self.activate(&mut order, ctx));
            self.orders.insert(id, order);
            self.sequence.push(id);
            outcomes.push(SubmitOutcome { order_id: id, result: Ok(()) });
        }

        self.wire_groups(&groups);
        (outcomes, changes)
    }

    /// Pending -> Submitted -> Accepted -> Working, stamping the latency gate
    /// and arrival price.
    fn activate(&mut self, order: &mut Order, ctx: &mut SubmitCtx) -> Vec<StateChange> {
        let mut changes = Vec::new();
        let transmission = ctx.latency.transmission.sample();
        let execution = ctx.latency.execution.sample();
        let accepted_at = ctx.now + transmission;
        let mut eligible_at = accepted_at + execution;

        // MOO/MOC orders queue for the relevant session boundary.
        match order.spec.tif {
            TimeInForce::Moo => {
                if let Some(open) = ctx.calendar.next_session_open(eligible_at) {
                    eligible_at = eligible_at.max(open);
                }
            }
            TimeInForce::Moc => {
                if let Some(close) = ctx.calendar.session_close(eligible_at.date_naive()) {
                    if close > eligible_at {
                        eligible_at = close;
                    } else if let Some(open) = ctx.calendar.next_session_open(eligible_at) {
                        if let Some(next_close) = ctx.calendar.session_close(open.date_naive()) {
                            eligible_at = next_close;
                        }
                    }
                }
            }
            _ => {}
        }

        order.eligible_at = eligible_at;
        order.arrival_price = (ctx.snapshot)(&order.spec.instrument).arrival_price();

        for (from, to) in [
            (OrderState::Pending, OrderState::Submitted),
            (OrderState::Submitted, OrderState::Accepted),
            (OrderState::Accepted, OrderState::Working),
        ] {
            order.state = to;
            changes.push(StateChange { order_id: order.id, from, to, reason: None });
        }
        order.updated_at = ctx.now;
        changes
    }

    fn wire_groups(&mut self, groups: &BTreeMap<u32, Vec<(OrderId, LinkKind, GroupRole)>>) {
        for members in groups.values() {
            match members.first().map(|(_, kind, _)| *kind) {
                Some(LinkKind::Oco) => {
                    let ids: Vec<OrderId> = members.iter().map(|(id, _, _)| *id).collect();
                    for (id, _, _) in members {
                        if let Some(order) = self.orders.get_mut(id) {
                            order.oco_siblings =
                                ids.iter().filter(|other| *other != id).copied().collect();
                        }
                    }
                }
                Some(LinkKind::Bracket) => {
                    let entry = members
                        .iter()
                        .find(|(_, _, role)| *role == GroupRole::Entry)
                        .map(|(id, _, _)| *id);
                    let children: Vec<OrderId> = members
                        .iter()
                        .filter(|(_, _, role)| *role != GroupRole::Entry)
                        .map(|(id, _, _)| *id)
                        .collect();
                    if let Some(entry_id) = entry {
                        if let Some(order) = self.orders.get_mut(&entry_id) {
                            order.children = children.clone();
                        }
                        for child_id in &children {
                            if let Some(child) = self.orders.get_mut(child_id) {
                                child.parent = Some(entry_id);
                                child.oco_siblings = children
                                    .iter()
                                    .filter(|other| *other != child_id)
                                    .copied()
                                    .collect();
                            }
                        }
                    }
                }
                None => {}
            }
        }
    }

    /// Mark a stop order's trigger as touched.
    pub fn note_trigger(&mut self, id: OrderId) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.triggered = true;
        }
    }

    /// Record a fill. Cancels OCO siblings atomically and promotes bracket
    /// children on the parent's first fill, all within the same tick.
    pub fn on_fill(
        &mut self,
        fill: &Fill,
        ctx: &mut SubmitCtx,
        ledger: &mut Ledger,
    ) -> Vec<StateChange> {
        let mut changes = Vec::new();
        let id = fill.order_id;

        let (prev_state, new_state, siblings, children, filled) = {
            let Some(order) = self.orders.get_mut(&id) else {
                return changes;
            };
            let prev_state = order.state;
            order.record_fill(fill.id, fill.price, fill.size, fill.commission, fill.timestamp);
            (
                prev_state,
                order.state,
                order.oco_siblings.clone(),
                order.children.clone(),
                order.state == OrderState::Filled,
            )
        };
        changes.push(StateChange { order_id: id, from: prev_state, to: new_state, reason: None });

        // Release the reserved cash consumed by this fill.
        if let Some(remaining_reserve) = self.reserved.get_mut(&id) {
            let initial_size = self.orders[&id].spec.size;
            let release = (*remaining_reserve * fill.size / initial_size).min(*remaining_reserve);
            ledger.release(release);
            *remaining_reserve -= release;
        }
        if filled {
            self.release_remaining(id, ledger);
        }

        if filled {
            // OCO: siblings cancel in the same tick.
            for sibling in siblings {
                changes.extend(self.cancel_internal(sibling, ctx.now, Some("oco sibling filled"), ledger));
            }
            // Bracket: children promote Pending -> Working in the same tick.
            for child_id in children {
                let mut taken = match self.orders.remove(&child_id) {
                    Some(order) if order.state == OrderState::Pending => order,
                    Some(order) => {
                        self.orders.insert(child_id, order);
                        continue;
                    }
                    None => continue,
                };
                changes.extend(self.activate(&mut taken, ctx));
                self.orders.insert(child_id, taken);
            }
        }
        changes
    }

    pub fn cancel(
        &mut self,
        id: OrderId,
        now: DateTime<Utc>,
        ledger: &mut Ledger,
    ) -> Vec<StateChange> {
        self.cancel_internal(id, now, None, ledger)
    }

    fn cancel_internal(
        &mut self,
        id: OrderId,
        now: DateTime<Utc>,
        reason: Option<&str>,
        ledger: &mut Ledger,
    ) -> Vec<StateChange> {
        let Some(order) = self.orders.get_mut(&id) else {
            return Vec::new();
        };
        if order.is_terminal() {
            return Vec::new();
        }
        let from = order.state;
        order.cancel(now);
        self.release_remaining(id, ledger);
        vec![StateChange {
            order_id: id,
            from,
            to: OrderState::Cancelled,
            reason: reason.map(str::to_string),
        }]
    }

    fn release_remaining(&mut self, id: OrderId, ledger: &mut Ledger) {
        if let Some(remaining) = self.reserved.remove(&id) {
            if remaining > Decimal::ZERO {
                ledger.release(remaining);
            }
        }
    }

    /// Modify a working order. A price change or size increase loses queue
    /// priority (cancel-replace under a new id); a size decrease keeps the
    /// original order and its priority.
    pub fn modify(
        &mut self,
        id: OrderId,
        new_price: Option<Decimal>,
        new_size: Option<Decimal>,
        ctx: &mut SubmitCtx,
        ledger: &mut Ledger,
    ) -> (Option<OrderId>, Vec<StateChange>) {
        let Some(order) = self.orders.get(&id) else {
            return (None, Vec::new());
        };
        if order.is_terminal() {
            return (None, Vec::new());
        }

        let price_changed = match (new_price, order.spec.order_type) {
            (Some(p), OrderType::Limit { limit }) => p != limit,
            (Some(p), OrderType::Stop { stop }) => p != stop,
            (Some(p), OrderType::StopLimit { limit, .. }) => p != limit,
            _ => false,
        };
        let size_increased = new_size.is_some_and(|s| s > order.spec.size);
        let size_decreased = new_size.is_some_and(|s| s < order.spec.size);

        if price_changed || size_increased {
            let mut spec = order.spec.clone();
            if let Some(p) = new_price {
                spec.order_type = match spec.order_type {
                    OrderType::Limit { .. } => OrderType::Limit { limit: p },
                    OrderType::Stop { .. } => OrderType::Stop { stop: p },
                    OrderType::StopLimit { stop, .. } => OrderType::StopLimit { stop, limit: p },
                    OrderType::Market => OrderType::Market,
                };
            }
            if let Some(s) = new_size {
                spec.size = s;
            }
            let strategy = order.strategy.clone();
            let mut changes = self.cancel_internal(id, ctx.now, Some("cancel-replace"), ledger);
            let (outcomes, submit_changes) =
                self.submit_batch(&strategy, vec![spec], ctx, ledger);
            changes.extend(submit_changes);
            let new_id = outcomes.first().map(|o| o.order_id);
            return (new_id, changes);
        }

        if size_decreased {
            let new_size = new_size.expect("size decrease checked");
            if let Some(order) = self.orders.get_mut(&id) {
                let released_fraction = order.spec.size - new_size;
                if let Some(reserve) = self.reserved.get_mut(&id) {
                    let release = *reserve * released_fraction / order.spec.size;
                    ledger.release(release);
                    *reserve -= release;
                }
                order.spec.size = new_size.max(order.filled_qty);
                order.updated_at = ctx.now;
            }
            return (Some(id), Vec::new());
        }

        (Some(id), Vec::new())
    }

    /// Cancel the unfilled remainder of IOC orders that have had their
    /// matching attempt this tick.
    pub fn expire_ioc(
        &mut self,
        attempted: &[OrderId],
        now: DateTime<Utc>,
        ledger: &mut Ledger,
    ) -> Vec<StateChange> {
        let mut changes = Vec::new();
        for id in attempted {
            let should_cancel = self
                .orders
                .get(id)
                .is_some_and(|o| o.spec.tif == TimeInForce::Ioc && o.is_working());
            if should_cancel {
                changes.extend(self.cancel_internal(*id, now, Some("ioc remainder"), ledger));
            }
        }
        changes
    }

    /// Expire day-scoped orders at session close. MOO orders survive the
    /// close; they fire at the next session open.
    pub fn expire_day_orders(&mut self, now: DateTime<Utc>, ledger: &mut Ledger) -> Vec<StateChange> {
        let day_orders: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| {
                !o.is_terminal()
                    && matches!(o.spec.tif, TimeInForce::Day | TimeInForce::Moc)
            })
            .map(|o| o.id)
            .collect();
        let mut changes = Vec::new();
        for id in day_orders {
            changes.extend(self.cancel_internal(id, now, Some("day order expired"), ledger));
        }
        changes
    }

    /// Cancel everything still open for one strategy (halt path).
    pub fn cancel_all_for(
        &mut self,
        strategy: &StrategyId,
        now: DateTime<Utc>,
        ledger: &mut Ledger,
    ) -> Vec<StateChange> {
        let ids: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| !o.is_terminal() && &o.strategy == strategy)
            .map(|o| o.id)
            .collect();
        let mut changes = Vec::new();
        for id in ids {
            changes.extend(self.cancel_internal(id, now, Some("strategy halted"), ledger));
        }
        changes
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WeekdayCalendar;
    use crate::domain::{FillId, GroupSpec};
    use crate::ledger::{AccountKind, SettlementMode};
    use crate::rng::SeedHierarchy;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn snapshot(_: &Instrument) -> MarketSnapshot {
        MarketSnapshot {
            bid: Some(dec!(99.95)),
            ask: Some(dec!(100.05)),
            last: Some(dec!(100.00)),
        }
    }

    fn known(_: &Instrument) -> bool {
        true
    }

    struct Rig {
        manager: OrderManager,
        ledger: Ledger,
        latency: LatencyModel,
        calendar: WeekdayCalendar,
    }

    impl Rig {
        fn new(capital: Decimal) -> Self {
            let seeds = SeedHierarchy::new(42);
            Self {
                manager: OrderManager::new(),
                ledger: Ledger::new(capital, "USD", SettlementMode::Immediate, AccountKind::Cash),
                latency: LatencyModel::zero(&seeds),
                calendar: WeekdayCalendar::full_day(),
            }
        }

        fn submit(&mut self, specs: Vec<OrderSpec>) -> (Vec<SubmitOutcome>, Vec<StateChange>) {
            let mut ctx = SubmitCtx {
                now: now(),
                latency: &mut self.latency,
                calendar: &self.calendar,
                snapshot: &snapshot,
                known: &known,
            };
            self.manager
                .submit_batch(&StrategyId::new("test"), specs, &mut ctx, &mut self.ledger)
        }

        fn fill(&mut self, order_id: OrderId, price: Decimal, size: Decimal) -> Vec<StateChange> {
            let fill = Fill {
                id: FillId(1),
                order_id,
                timestamp: now(),
                instrument: Instrument::equity("SPY"),
                side: self.manager.get(&order_id).unwrap().spec.side,
                price,
                size,
                commission: Decimal::ZERO,
                slippage: Decimal::ZERO,
                snapshot: snapshot(&Instrument::equity("SPY")),
            };
            let mut ctx = SubmitCtx {
                now: now(),
                latency: &mut self.latency,
                calendar: &self.calendar,
                snapshot: &snapshot,
                known: &known,
            };
            self.manager.on_fill(&fill, &mut ctx, &mut self.ledger)
        }
    }

    fn spy() -> Instrument {
        Instrument::equity("SPY")
    }

    #[test]
    fn accepted_order_reaches_working() {
        let mut rig = Rig::new(dec!(100000));
        let (outcomes, changes) =
            rig.submit(vec![OrderSpec::market(spy(), OrderSide::Buy, dec!(10))]);
        assert!(outcomes[0].result.is_ok());
        let states: Vec<OrderState> = changes.iter().map(|c| c.to).collect();
        assert_eq!(
            states,
            vec![OrderState::Submitted, OrderState::Accepted, OrderState::Working]
        );
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut rig = Rig::new(dec!(100000));
        let (outcomes, _) = rig.submit(vec![OrderSpec::market(spy(), OrderSide::Buy, dec!(0))]);
        assert!(matches!(outcomes[0].result, Err(RejectReason::Validation(_))));
    }

    #[test]
    fn insufficient_buying_power_rejects_buy() {
        let mut rig = Rig::new(dec!(500));
        let (outcomes, _) = rig.submit(vec![OrderSpec::market(spy(), OrderSide::Buy, dec!(10))]);
        assert_eq!(outcomes[0].result, Err(RejectReason::InsufficientBuyingPower));
    }

    #[test]
    fn buy_reserves_and_fill_releases() {
        let mut rig = Rig::new(dec!(10000));
        let (outcomes, _) = rig.submit(vec![OrderSpec::market(spy(), OrderSide::Buy, dec!(10))]);
        let id = outcomes[0].order_id;
        // Estimated at the ask: 100.05 * 10.
        assert_eq!(rig.ledger.account().reserved(), dec!(1000.50));
        rig.fill(id, dec!(100.05), dec!(10));
        assert_eq!(rig.ledger.account().reserved(), Decimal::ZERO);
    }

    #[test]
    fn oco_fill_cancels_sibling_in_same_tick() {
        let mut rig = Rig::new(dec!(100000));
        let oco = |role| GroupSpec { group: 1, kind: LinkKind::Oco, role };
        let (outcomes, _) = rig.submit(vec![
            OrderSpec::limit(spy(), OrderSide::Buy, dec!(10), dec!(99))
                .with_link(oco(GroupRole::Member)),
            OrderSpec::stop(spy(), OrderSide::Buy, dec!(10), dec!(103))
                .with_link(oco(GroupRole::Member)),
        ]);
        let limit_id = outcomes[0].order_id;
        let stop_id = outcomes[1].order_id;

        let changes = rig.fill(stop_id, dec!(103.2), dec!(10));
        assert_eq!(rig.manager.get(&stop_id).unwrap().state, OrderState::Filled);
        assert_eq!(rig.manager.get(&limit_id).unwrap().state, OrderState::Cancelled);
        assert!(changes
            .iter()
            .any(|c| c.order_id == limit_id && c.to == OrderState::Cancelled));
    }

    #[test]
    fn bracket_children_promote_on_entry_fill() {
        let mut rig = Rig::new(dec!(100000));
        let bracket = |role| GroupSpec { group: 1, kind: LinkKind::Bracket, role };
        let (outcomes, _) = rig.submit(vec![
            OrderSpec::market(spy(), OrderSide::Buy, dec!(10))
                .with_link(bracket(GroupRole::Entry)),
            OrderSpec::limit(spy(), OrderSide::Sell, dec!(10), dec!(105))
                .with_link(bracket(GroupRole::TakeProfit)),
            OrderSpec::stop(spy(), OrderSide::Sell, dec!(10), dec!(95))
                .with_link(bracket(GroupRole::StopLoss)),
        ]);
        let entry = outcomes[0].order_id;
        let tp = outcomes[1].order_id;
        let sl = outcomes[2].order_id;

        assert_eq!(rig.manager.get(&tp).unwrap().state, OrderState::Pending);
        assert_eq!(rig.manager.get(&sl).unwrap().state, OrderState::Pending);

        rig.fill(entry, dec!(100.05), dec!(10));
        assert_eq!(rig.manager.get(&tp).unwrap().state, OrderState::Working);
        assert_eq!(rig.manager.get(&sl).unwrap().state, OrderState::Working);
        // TP and SL form an OCO pair.
        assert_eq!(rig.manager.get(&tp).unwrap().oco_siblings, vec![sl]);
    }

    #[test]
    fn price_change_is_cancel_replace() {
        let mut rig = Rig::new(dec!(100000));
        let (outcomes, _) =
            rig.submit(vec![OrderSpec::limit(spy(), OrderSide::Buy, dec!(10), dec!(99))]);
        let id = outcomes[0].order_id;

        let mut ctx = SubmitCtx {
            now: now(),
            latency: &mut rig.latency,
            calendar: &rig.calendar,
            snapshot: &snapshot,
            known: &known,
        };
        let (new_id, _) =
            rig.manager
                .modify(id, Some(dec!(98)), None, &mut ctx, &mut rig.ledger);
        let new_id = new_id.unwrap();
        assert_ne!(new_id, id);
        assert_eq!(rig.manager.get(&id).unwrap().state, OrderState::Cancelled);
        assert_eq!(
            rig.manager.get(&new_id).unwrap().spec.order_type.limit_price(),
            Some(dec!(98))
        );
    }

    #[test]
    fn size_decrease_preserves_order() {
        let mut rig = Rig::new(dec!(100000));
        let (outcomes, _) =
            rig.submit(vec![OrderSpec::limit(spy(), OrderSide::Buy, dec!(10), dec!(99))]);
        let id = outcomes[0].order_id;

        let mut ctx = SubmitCtx {
            now: now(),
            latency: &mut rig.latency,
            calendar: &rig.calendar,
            snapshot: &snapshot,
            known: &known,
        };
        let (kept, changes) = rig
            .manager
            .modify(id, None, Some(dec!(5)), &mut ctx, &mut rig.ledger);
        assert_eq!(kept, Some(id));
        assert!(changes.is_empty());
        assert_eq!(rig.manager.get(&id).unwrap().spec.size, dec!(5));
        assert_eq!(rig.manager.get(&id).unwrap().state, OrderState::Working);
    }

    #[test]
    fn ioc_remainder_cancels_after_attempt() {
        let mut rig = Rig::new(dec!(100000));
        let (outcomes, _) = rig.submit(vec![
            OrderSpec::market(spy(), OrderSide::Buy, dec!(100)).with_tif(TimeInForce::Ioc),
        ]);
        let id = outcomes[0].order_id;
        rig.fill(id, dec!(100.05), dec!(40));

        let changes = rig.manager.expire_ioc(&[id], now(), &mut rig.ledger);
        assert!(changes.iter().any(|c| c.to == OrderState::Cancelled));
        let order = rig.manager.get(&id).unwrap();
        assert_eq!(order.filled_qty, dec!(40));
        assert_eq!(order.cancelled_qty, dec!(60));
    }
}
