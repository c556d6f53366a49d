//! L2 order-book fill model.
//!
//! Reconstructs a book from depth snapshots. Market orders consume liquidity
//! level by level in price-time priority, one proposal per level touched.
//! Limit orders rest at their level with a configurable queue position and
//! fill when aggressor prints arrive at or through the level and exhaust the
//! queue ahead.

use super::{effective_type, is_actionable, FillContext, FillModel, FillProposal};
use crate::domain::{
    DepthLevels, MarketPayload, Order, OrderId, OrderSide, OrderType,
};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Where a freshly resting limit order joins its price level's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    Back,
    Random,
    Front,
}

#[derive(Debug, Default, Clone)]
struct BookSide {
    /// Best level first.
    levels: DepthLevels,
}

impl BookSide {
    fn size_at(&self, price: Decimal) -> Decimal {
        self.levels
            .iter()
            .find(|(p, _)| *p == price)
            .map(|(_, s)| *s)
            .unwrap_or(Decimal::ZERO)
    }

    /// Consume up to `size` starting at the best level. Returns (price, taken)
    /// per level touched and mutates the book.
    fn consume(&mut self, size: Decimal) -> Vec<(Decimal, Decimal)> {
        let mut taken = Vec::new();
        let mut remaining = size;
        for (price, available) in self.levels.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(*available);
            if take > Decimal::ZERO {
                taken.push((*price, take));
                *available -= take;
                remaining -= take;
            }
        }
        self.levels.retain(|(_, s)| *s > Decimal::ZERO);
        taken
    }
}

#[derive(Debug, Clone)]
struct RestingOrder {
    /// Displayed size queued ahead of us at our level.
    queue_ahead: Decimal,
}

/// Book state per instrument plus resting-order queue tracking.
pub struct OrderBookFill {
    queue_position: QueuePosition,
    rng: ChaCha8Rng,
    books: HashMap<crate::domain::Instrument, (BookSide, BookSide)>,
    resting: HashMap<OrderId, RestingOrder>,
}

impl OrderBookFill {
    pub fn new(queue_position: QueuePosition, rng: ChaCha8Rng) -> Self {
        Self {
            queue_position,
            rng,
            books: HashMap::new(),
            resting: HashMap::new(),
        }
    }

    fn initial_queue_ahead(&mut self, displayed: Decimal) -> Decimal {
        match self.queue_position {
            QueuePosition::Back => displayed,
            QueuePosition::Front => Decimal::ZERO,
            QueuePosition::Random => {
                let fraction: f64 = self.rng.gen();
                displayed * Decimal::try_from(fraction).unwrap_or(Decimal::ONE)
            }
        }
    }

    fn on_depth(&mut self, order: &Order, ctx: &FillContext) {
        let Some(event) = ctx.event else { return };
        let MarketPayload::Depth(depth) = &event.payload else {
            return;
        };
        let entry = self
            .books
            .entry(event.instrument.clone())
            .or_insert_with(|| (BookSide::default(), BookSide::default()));
        entry.0.levels = depth.bids.clone();
        entry.1.levels = depth.asks.clone();

        // Register a resting limit order the first time we see depth for it.
        if let OrderType::Limit { limit } = effective_type(order) {
            if order.spec.instrument == event.instrument && !self.resting.contains_key(&order.id) {
                let same_side = match order.spec.side {
                    OrderSide::Buy => &entry.0,
                    OrderSide::Sell => &entry.1,
                };
                let displayed = same_side.size_at(limit);
                let queue_ahead = self.initial_queue_ahead(displayed);
                self.resting.insert(order.id, RestingOrder { queue_ahead });
            }
        }
    }

    fn market_proposals(&mut self, order: &Order) -> Vec<FillProposal> {
        let Some((bids, asks)) = self.books.get_mut(&order.spec.instrument) else {
            return Vec::new();
        };
        let side = match order.spec.side {
            OrderSide::Buy => asks,
            OrderSide::Sell => bids,
        };
        side.consume(order.remaining_qty())
            .into_iter()
            .map(|(price, size)| FillProposal { price, size })
            .collect()
    }

    fn limit_proposals(&mut self, order: &Order, ctx: &FillContext, limit: Decimal) -> Vec<FillProposal> {
        // Aggressor flow at or through our level consumes queue ahead first.
        let Some(event) = ctx.event else {
            return Vec::new();
        };
        if event.instrument != order.spec.instrument {
            return Vec::new();
        }
        let MarketPayload::Trade(tick) = &event.payload else {
            return Vec::new();
        };
        let crosses = match order.spec.side {
            OrderSide::Buy => tick.price <= limit,
            OrderSide::Sell => tick.price >= limit,
        };
        if !crosses {
            return Vec::new();
        }
        let Some(resting) = self.resting.get_mut(&order.id) else {
            return Vec::new();
        };
        let ahead = resting.queue_ahead;
        if tick.size <= ahead {
            resting.queue_ahead = ahead - tick.size;
            return Vec::new();
        }
        let available = tick.size - ahead;
        resting.queue_ahead = Decimal::ZERO;
        let size = order.remaining_qty().min(available);
        if size <= Decimal::ZERO {
            return Vec::new();
        }
        vec![FillProposal { price: limit, size }]
    }
}

impl FillModel for OrderBookFill {
    fn propose(&mut self, order: &Order, ctx: &FillContext) -> Vec<FillProposal> {
        self.on_depth(order, ctx);
        if !is_actionable(order) {
            return Vec::new();
        }
        match effective_type(order) {
            OrderType::Market => self.market_proposals(order),
            OrderType::Limit { limit } => self.limit_proposals(order, ctx, limit),
            OrderType::Stop { .. } | OrderType::StopLimit { .. } => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "order_book"
    }
}
