//! Composition root tying resolution, fusion and alerting together.

use std::sync::Arc;

use common::config::AppConfig;
use common::provider::{
    AuthoritativeAqiProvider, ForecastProvider, GeocodeProvider, Notifier,
    PollutantDetailProvider, SubscriptionStore,
};
use common::{AqiScore, DispatchDecision, LabelledForecast, Place, PollutantSample, Result};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::FusionCache;
use crate::forecast::label_forecast;
use crate::ranking::{rank_most_polluted, PlaceReading};
use crate::resolver::PlaceResolver;
use crate::throttle::AlertThrottleEngine;

/// Everything learned from one check of one place.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub place: Place,
    pub score: AqiScore,
    pub sample: PollutantSample,
    pub decisions: Vec<DispatchDecision>,
    pub forecast: Vec<LabelledForecast>,
}

impl CheckReport {
    pub fn alerts_sent(&self) -> usize {
        self.decisions.iter().filter(|d| d.should_send).count()
    }
}

pub struct Monitor {
    resolver: PlaceResolver,
    cache: FusionCache,
    throttle: AlertThrottleEngine,
    store: Arc<dyn SubscriptionStore>,
    forecaster: Option<Arc<dyn ForecastProvider>>,
}

impl Monitor {
    pub fn new(
        config: &AppConfig,
        geocoder: Arc<dyn GeocodeProvider>,
        authoritative: Arc<dyn AuthoritativeAqiProvider>,
        detail: Arc<dyn PollutantDetailProvider>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn SubscriptionStore>,
    ) -> Self {
        Self {
            resolver: PlaceResolver::new(geocoder, config),
            cache: FusionCache::new(authoritative, detail, config),
            throttle: AlertThrottleEngine::new(notifier, Arc::clone(&store), &config.throttle),
            store,
            forecaster: None,
        }
    }

    pub fn with_forecaster(mut self, forecaster: Arc<dyn ForecastProvider>) -> Self {
        self.forecaster = Some(forecaster);
        self
    }

    pub fn cache(&self) -> &FusionCache {
        &self.cache
    }

    /// Resolve and fuse without touching subscriptions.
    pub async fn reading(&self, place_text: &str) -> Result<PlaceReading> {
        let place = self.resolver.resolve(place_text).await?;
        let (score, sample) = self.cache.get_aqi(&place).await?;
        Ok(PlaceReading {
            place,
            score,
            sample,
        })
    }

    /// Full check: current AQI, alert decisions and an optional forecast.
    pub async fn check(&self, place_text: &str, forecast_days: u32) -> Result<CheckReport> {
        let PlaceReading {
            place,
            score,
            sample,
        } = self.reading(place_text).await?;

        let mut subscriptions = match self.store.active_for_place(&place.name).await {
            Ok(subs) => subs,
            Err(e) => {
                warn!("{}: could not load subscriptions: {}", place.name, e);
                Vec::new()
            }
        };
        let decisions = self
            .throttle
            .evaluate(&place, &score, &sample, &mut subscriptions)
            .await;

        let forecast = self.forecast(&place, &sample, forecast_days);

        info!(
            "{}: AQI {} ({}, {:?}), {} of {} subscribers alerted",
            place.name,
            score.rounded(),
            score.category,
            score.source,
            decisions.iter().filter(|d| d.should_send).count(),
            decisions.len()
        );

        Ok(CheckReport {
            place,
            score,
            sample,
            decisions,
            forecast,
        })
    }

    fn forecast(&self, place: &Place, sample: &PollutantSample, days: u32) -> Vec<LabelledForecast> {
        let Some(forecaster) = self.forecaster.as_ref().filter(|_| days > 0) else {
            return Vec::new();
        };
        match forecaster.forecast(sample, days) {
            Ok(points) => label_forecast(&points),
            Err(e) => {
                warn!("{}: forecast unavailable: {}", place.name, e);
                Vec::new()
            }
        }
    }

    /// Check several places concurrently; one failure does not affect the rest.
    pub async fn sweep(&self, places: &[String], forecast_days: u32) -> Vec<(String, Result<CheckReport>)> {
        let results = join_all(places.iter().map(|p| self.check(p, forecast_days))).await;
        places.iter().cloned().zip(results).collect()
    }

    /// Current readings for `places`, most polluted first.
    pub async fn rank(&self, places: &[String], limit: usize) -> Vec<PlaceReading> {
        let results = join_all(places.iter().map(|p| self.reading(p))).await;
        let readings = places
            .iter()
            .zip(results)
            .filter_map(|(name, result)| match result {
                Ok(reading) => Some(reading),
                Err(e) => {
                    warn!("Skipping {} in ranking: {}", name, e);
                    None
                }
            })
            .collect();
        rank_most_polluted(readings, limit)
    }
}
