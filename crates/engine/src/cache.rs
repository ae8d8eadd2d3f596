//! Fusion cache for authoritative AQI readings.
//!
//! The authoritative provider is rate-limited, so its answers (including
//! failures, stored as `None`) are kept per rounded coordinate for a fixed
//! TTL. Each key has its own async mutex: the first caller on a miss fetches
//! while later callers for the same key wait and then reuse the fresh entry,
//! so one TTL window costs at most one provider call per key.
//!
//! The pollutant-detail provider is always called; it carries the full
//! breakdown and the PM2.5 used for the calculated fallback.

use std::sync::Arc;
use std::time::Duration;

use common::aqi::aqi_from_pm25;
use common::config::{AppConfig, MAX_CACHE_TTL_SECS};
use common::provider::{AuthoritativeAqiProvider, PollutantDetailProvider};
use common::{AqiScore, AqiSource, AuthoritativeReading, Error, Place, PollutantSample, Result};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Coordinates rounded to a fixed number of decimals, stored as scaled integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat: i64,
    lon: i64,
}

impl CacheKey {
    pub fn new(lat: f64, lon: f64, precision: u32) -> Self {
        let scale = 10f64.powi(precision as i32);
        Self {
            lat: (lat * scale).round() as i64,
            lon: (lon * scale).round() as i64,
        }
    }
}

/// A cached authoritative answer; `reading: None` is a negative entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub reading: Option<AuthoritativeReading>,
    pub captured_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type Slot = Arc<Mutex<Option<CacheEntry>>>;

pub struct FusionCache {
    authoritative: Arc<dyn AuthoritativeAqiProvider>,
    detail: Arc<dyn PollutantDetailProvider>,
    slots: DashMap<CacheKey, Slot>,
    ttl: Duration,
    timeout: Duration,
    precision: u32,
}

impl FusionCache {
    pub fn new(
        authoritative: Arc<dyn AuthoritativeAqiProvider>,
        detail: Arc<dyn PollutantDetailProvider>,
        config: &AppConfig,
    ) -> Self {
        Self {
            authoritative,
            detail,
            slots: DashMap::new(),
            ttl: Duration::from_secs(config.cache.ttl_secs.min(MAX_CACHE_TTL_SECS)),
            timeout: Duration::from_millis(config.providers.timeout_ms),
            precision: config.cache.coordinate_precision,
        }
    }

    /// Canonical AQI and pollutant detail for a resolved place.
    ///
    /// Authoritative-provider trouble never fails this call; it degrades to
    /// an AQI calculated from PM2.5. Only a missing pollutant breakdown is an
    /// error, since there is nothing to fall back on.
    pub async fn get_aqi(&self, place: &Place) -> Result<(AqiScore, PollutantSample)> {
        if !place.is_resolved() {
            return Err(Error::PlaceNotFound(format!(
                "{} has no resolved coordinates",
                place.name
            )));
        }

        let key = CacheKey::new(place.lat, place.lon, self.precision);
        let (reading, detail) = tokio::join!(
            self.authoritative_reading(key, place),
            self.pollutant_detail(place)
        );

        let sample = detail?;
        fuse(reading, sample)
    }

    async fn authoritative_reading(&self, key: CacheKey, place: &Place) -> Option<AuthoritativeReading> {
        let slot = Arc::clone(&self.slots.entry(key).or_default());
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.is_live(Instant::now()) {
                debug!(
                    "{}: cache hit ({})",
                    place.name,
                    if cached.reading.is_some() { "positive" } else { "negative" }
                );
                return cached.reading;
            }
        }

        let reading = match timeout(self.timeout, self.authoritative.fetch(place.lat, place.lon)).await {
            Ok(Ok(reading)) if reading.is_usable() => Some(reading),
            Ok(Ok(reading)) => {
                debug!("{}: authoritative AQI {} unusable", place.name, reading.aqi);
                None
            }
            Ok(Err(e)) => {
                warn!("{}: authoritative AQI unavailable: {}", place.name, e);
                None
            }
            Err(_) => {
                warn!(
                    "{}: authoritative AQI timed out after {:?}",
                    place.name, self.timeout
                );
                None
            }
        };

        let captured_at = Instant::now();
        *entry = Some(CacheEntry {
            reading,
            captured_at,
            expires_at: captured_at
                .checked_add(self.ttl)
                .unwrap_or(captured_at + Duration::from_secs(MAX_CACHE_TTL_SECS)),
        });
        reading
    }

    async fn pollutant_detail(&self, place: &Place) -> Result<PollutantSample> {
        match timeout(self.timeout, self.detail.fetch(place.lat, place.lon)).await {
            Ok(Ok(sample)) => sample.validated(),
            Ok(Err(e)) => {
                warn!("{}: pollutant detail unavailable: {}", place.name, e);
                Err(Error::PollutantDataUnavailable(format!("{}: {}", place.name, e)))
            }
            Err(_) => {
                warn!("{}: pollutant detail timed out after {:?}", place.name, self.timeout);
                Err(Error::PollutantDataUnavailable(format!(
                    "{}: timed out after {}ms",
                    place.name,
                    self.timeout.as_millis()
                )))
            }
        }
    }

    /// Drop expired entries nobody is currently using.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(entry) => entry.as_ref().is_some_and(|e| e.is_live(now)),
            Err(_) => true,
        });
        before - self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Combine an optional authoritative reading with the pollutant breakdown.
fn fuse(
    reading: Option<AuthoritativeReading>,
    sample: PollutantSample,
) -> Result<(AqiScore, PollutantSample)> {
    match reading {
        Some(reading) => {
            let sample = match reading.usable_pm25() {
                Some(pm25) => sample.with_pm25(pm25),
                None => sample,
            };
            Ok((AqiScore::new(reading.aqi, AqiSource::Authoritative), sample))
        }
        None => {
            let aqi = aqi_from_pm25(sample.pm25)?;
            Ok((AqiScore::new(aqi, AqiSource::Calculated), sample))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{place, AuthoritativeBehavior, FakeAuthoritative, FakeDetail};
    use common::AqiCategory;

    fn cache(auth: Arc<FakeAuthoritative>, detail: Arc<FakeDetail>) -> FusionCache {
        FusionCache::new(auth, detail, &AppConfig::default())
    }

    #[test]
    fn test_key_rounds_to_two_decimals() {
        assert_eq!(CacheKey::new(31.5497, 74.3436, 2), CacheKey::new(31.5512, 74.3401, 2));
        assert_ne!(CacheKey::new(31.5497, 74.3436, 2), CacheKey::new(31.5612, 74.3436, 2));
        assert_eq!(CacheKey::new(-33.8688, 151.2093, 2), CacheKey::new(-33.87, 151.21, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authoritative_value_wins_and_overrides_pm25() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Reading {
            aqi: 168.0,
            pm25: Some(88.5),
        }));
        let detail = Arc::new(FakeDetail::new(Some(45.0)));
        let c = cache(auth, detail);

        let (score, sample) = c.get_aqi(&place("Lahore", 31.5497, 74.3436)).await.expect("fused");
        assert_eq!(score.source, AqiSource::Authoritative);
        assert_eq!(score.value, 168.0);
        assert_eq!(score.category, AqiCategory::Unhealthy);
        assert_eq!(sample.pm25, 88.5);
        assert_eq!(sample.pm10, 75.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authoritative_without_pm25_keeps_detail_pm25() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Reading {
            aqi: 90.0,
            pm25: None,
        }));
        let c = cache(auth, Arc::new(FakeDetail::new(Some(30.0))));

        let (score, sample) = c.get_aqi(&place("Paris", 48.8566, 2.3522)).await.expect("fused");
        assert_eq!(score.source, AqiSource::Authoritative);
        assert_eq!(sample.pm25, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_provider_falls_back_to_calculated() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Failing));
        let c = cache(auth, Arc::new(FakeDetail::new(Some(45.0))));

        let (score, sample) = c.get_aqi(&place("Delhi", 28.6139, 77.2090)).await.expect("fused");
        assert_eq!(score.source, AqiSource::Calculated);
        assert_eq!(score.value, aqi_from_pm25(45.0).expect("valid"));
        assert!((score.value - 124.39).abs() < 0.01);
        assert_eq!(score.category, AqiCategory::UnhealthyForSensitive);
        assert_eq!(sample.pm25, 45.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_provider_call_per_key_within_ttl() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Reading {
            aqi: 120.0,
            pm25: None,
        }));
        let detail = Arc::new(FakeDetail::new(Some(20.0)));
        let c = cache(auth.clone(), detail.clone());

        c.get_aqi(&place("Rome", 41.9028, 12.4964)).await.expect("first");
        tokio::time::advance(Duration::from_secs(300)).await;
        // Nearby coordinates collapse onto the same key.
        c.get_aqi(&place("Rome", 41.9031, 12.4959)).await.expect("second");

        assert_eq!(auth.calls(), 1);
        assert_eq!(detail.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refetches() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Reading {
            aqi: 120.0,
            pm25: None,
        }));
        let c = cache(auth.clone(), Arc::new(FakeDetail::new(Some(20.0))));
        let p = place("Rome", 41.9028, 12.4964);

        c.get_aqi(&p).await.expect("first");
        tokio::time::advance(Duration::from_secs(601)).await;
        c.get_aqi(&p).await.expect("second");

        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_answer_is_negatively_cached() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::RateLimited));
        let c = cache(auth.clone(), Arc::new(FakeDetail::new(Some(45.0))));
        let p = place("Karachi", 24.8607, 67.0011);

        let (first, _) = c.get_aqi(&p).await.expect("first");
        // Provider recovers, but the negative entry is still live.
        auth.set(AuthoritativeBehavior::Reading { aqi: 200.0, pm25: None });
        tokio::time::advance(Duration::from_secs(60)).await;
        let (second, _) = c.get_aqi(&p).await.expect("second");

        assert_eq!(first.source, AqiSource::Calculated);
        assert_eq!(second.source, AqiSource::Calculated);
        assert_eq!(auth.calls(), 1);

        tokio::time::advance(Duration::from_secs(600)).await;
        let (third, _) = c.get_aqi(&p).await.expect("third");
        assert_eq!(third.source, AqiSource::Authoritative);
        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_degrades_after_timeout() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Hang));
        let c = cache(auth.clone(), Arc::new(FakeDetail::new(Some(45.0))));

        let started = Instant::now();
        let (score, _) = c.get_aqi(&place("Cairo", 30.0444, 31.2357)).await.expect("fused");

        assert_eq!(score.source, AqiSource::Calculated);
        assert!(started.elapsed() <= Duration::from_millis(8_000) + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_call() {
        let auth = Arc::new(
            FakeAuthoritative::new(AuthoritativeBehavior::Reading { aqi: 150.0, pm25: None })
                .with_delay(Duration::from_secs(2)),
        );
        let c = cache(auth.clone(), Arc::new(FakeDetail::new(Some(10.0))));
        let p = place("Seoul", 37.5665, 126.9780);

        let (a, b, d) = tokio::join!(c.get_aqi(&p), c.get_aqi(&p), c.get_aqi(&p));
        for result in [a, b, d] {
            assert_eq!(result.expect("fused").0.source, AqiSource::Authoritative);
        }
        assert_eq!(auth.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_detail_is_an_error() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Reading {
            aqi: 150.0,
            pm25: None,
        }));
        let c = cache(auth, Arc::new(FakeDetail::new(None)));

        let err = c.get_aqi(&place("Lima", -12.0464, -77.0428)).await.unwrap_err();
        assert!(matches!(err, Error::PollutantDataUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolved_place_rejected_without_calls() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Failing));
        let detail = Arc::new(FakeDetail::new(Some(10.0)));
        let c = cache(auth.clone(), detail.clone());

        assert!(c.get_aqi(&Place::unresolved("Lima")).await.is_err());
        assert_eq!(auth.calls(), 0);
        assert_eq!(detail.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_expired_entries() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::RateLimited));
        let c = cache(auth, Arc::new(FakeDetail::new(Some(10.0))));

        c.get_aqi(&place("Oslo", 59.9139, 10.7522)).await.expect("first");
        tokio::time::advance(Duration::from_secs(601)).await;
        c.get_aqi(&place("Lima", -12.0464, -77.0428)).await.expect("second");

        assert_eq!(c.len(), 2);
        assert_eq!(c.purge_expired(), 1);
        assert_eq!(c.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_ttl_is_clamped() {
        let auth = Arc::new(FakeAuthoritative::new(AuthoritativeBehavior::Reading {
            aqi: 120.0,
            pm25: None,
        }));
        let mut config = AppConfig::default();
        config.cache.ttl_secs = u64::MAX;
        let c = FusionCache::new(auth.clone(), Arc::new(FakeDetail::new(Some(20.0))), &config);
        let p = place("Rome", 41.9028, 12.4964);

        c.get_aqi(&p).await.expect("first");
        tokio::time::advance(Duration::from_secs(MAX_CACHE_TTL_SECS - 1)).await;
        c.get_aqi(&p).await.expect("still cached");
        assert_eq!(auth.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        c.get_aqi(&p).await.expect("refetched");
        assert_eq!(auth.calls(), 2);
    }
}
