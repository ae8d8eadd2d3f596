//! Capabilities the core consumes from external collaborators.
//!
//! HTTP clients implement these in their own crates; tests use in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{
    AqiScore, AuthoritativeReading, ForecastPoint, GeocodeCandidate, PollutantSample,
    Subscription, SubscriptionId,
};
use crate::Result;

/// Free-text place lookup.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Best single candidate for `name`, or `None` when nothing matched.
    async fn lookup(&self, name: &str) -> Result<Option<GeocodeCandidate>>;
}

/// Rate-limited source of directly measured AQI.
#[async_trait]
pub trait AuthoritativeAqiProvider: Send + Sync {
    /// Returns `Error::RateLimited` when the provider refuses the call.
    async fn fetch(&self, lat: f64, lon: f64) -> Result<AuthoritativeReading>;
}

/// Source of full pollutant breakdowns (no AQI).
#[async_trait]
pub trait PollutantDetailProvider: Send + Sync {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<PollutantSample>;
}

/// Outbound alert transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        subscriber: &str,
        place_name: &str,
        score: &AqiScore,
        sample: &PollutantSample,
    ) -> Result<()>;
}

/// Owner of subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions whose target is `place_name`.
    async fn active_for_place(&self, place_name: &str) -> Result<Vec<Subscription>>;

    async fn record_alert_sent(&self, id: SubscriptionId, at: DateTime<Utc>) -> Result<()>;
}

/// Offline-trained forecaster, loaded once by whoever composes the core.
pub trait ForecastProvider: Send + Sync {
    fn forecast(&self, sample: &PollutantSample, horizon_days: u32) -> Result<Vec<ForecastPoint>>;
}
