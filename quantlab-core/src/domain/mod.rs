//! Domain types shared across the engine.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod position;
pub mod signal;

pub use bar::{
    Bar, BarData, DataError, DepthLevels, DepthSnapshot, MarketEvent, MarketPayload, QuoteBar,
    QuoteTick, TradeBar, TradeTick,
};
pub use fill::{Fill, MarketSnapshot};
pub use ids::{FillId, IdGen, OrderId, StrategyId};
pub use instrument::{AssetClass, Instrument, OptionRight, Resolution};
pub use order::{
    GroupRole, GroupSpec, LinkKind, Order, OrderSide, OrderSpec, OrderState, OrderType,
    RejectReason, TimeInForce,
};
pub use position::Position;
pub use signal::{Signal, SignalError, TargetPortfolio};
