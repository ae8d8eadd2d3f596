//! Core air-quality engine.
//!
//! Resolves place names, fuses provider data into a canonical AQI behind a
//! short-lived cache, and decides which subscribers to alert.

pub mod cache;
pub mod forecast;
pub mod monitor;
pub mod ranking;
pub mod resolver;
pub mod store;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheKey, FusionCache};
pub use forecast::{label_forecast, PersistenceForecaster};
pub use monitor::{CheckReport, Monitor};
pub use ranking::{rank_most_polluted, PlaceReading};
pub use resolver::{MatchRule, PlaceResolver};
pub use store::InMemorySubscriptionStore;
pub use throttle::{AlertThrottleEngine, ThrottleWindows};
