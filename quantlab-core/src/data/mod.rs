//! Data boundary: feeds, subscriptions, and the point-in-time data context.

pub mod context;
pub mod feed;
pub mod subscriptions;

pub use context::{BarPriceSource, DataContext};
pub use feed::{DataFeed, SubscriptionHandle, VecFeed};
pub use subscriptions::SubscriptionSet;
