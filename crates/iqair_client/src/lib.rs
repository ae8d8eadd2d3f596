//! IQAir AirVisual API client.
//!
//! Fetches the nearest station's US AQI for a coordinate pair from
//! `/v2/nearest_city`. The free tier allows roughly 10k calls a month, so
//! every call first passes a client-side quota guard.

pub mod quota;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::config::ProvidersConfig;
use common::provider::AuthoritativeAqiProvider;
use common::{AuthoritativeReading, Error};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::quota::QuotaGuard;

const PROVIDER: &str = "IQAir";

/// IQAir API client with connection pooling and a per-minute quota guard.
#[derive(Debug, Clone)]
pub struct IqAirClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    quota: QuotaGuard,
}

// ── IQAir response types ──────────────────────────────────────────────

/// Envelope returned by every AirVisual endpoint.
#[derive(Debug, Deserialize)]
pub struct NearestCityResponse {
    pub status: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NearestCityData {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub country: String,
    pub current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
pub struct CurrentConditions {
    pub pollution: Pollution,
}

#[derive(Debug, Deserialize)]
pub struct Pollution {
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    /// US AQI.
    #[serde(default)]
    pub aqius: f64,
    #[serde(default)]
    pub p2: Option<Concentration>,
}

#[derive(Debug, Deserialize)]
pub struct Concentration {
    #[serde(default)]
    pub conc: Option<f64>,
}

// ── Implementation ────────────────────────────────────────────────────

impl IqAirClient {
    pub fn new(api_key: String, providers: &ProvidersConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("air-sentinel/0.1")
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_millis(providers.timeout_ms))
            .build()
            .map_err(|e| Error::Http(format!("failed to build IQAir HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: providers.iqair_base_url.trim_end_matches('/').to_string(),
            quota: QuotaGuard::per_minute(providers.iqair_requests_per_minute),
        })
    }

    /// Fetch the nearest-station reading for a coordinate pair.
    pub async fn nearest_city(&self, lat: f64, lon: f64) -> Result<AuthoritativeReading, Error> {
        if !self.quota.try_acquire() {
            debug!("IQAir local quota exhausted, skipping call for ({lat},{lon})");
            return Err(Error::RateLimited { provider: PROVIDER });
        }

        let url = format!("{}/nearest_city", self.base_url);
        debug!("Fetching IQAir nearest_city: {} lat={} lon={}", url, lat, lon);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::ProviderUnavailable {
                        provider: PROVIDER,
                        reason: format!("request timed out for ({lat},{lon})"),
                    }
                } else {
                    Error::ProviderUnavailable {
                        provider: PROVIDER,
                        reason: format!("HTTP error for ({lat},{lon}): {e}"),
                    }
                }
            })?;

        let status = resp.status().as_u16();
        if status == 429 {
            warn!("IQAir rate limited for ({lat},{lon})");
            return Err(Error::RateLimited { provider: PROVIDER });
        }

        let body = resp.text().await.unwrap_or_default();
        if status != 200 {
            return Err(Error::ProviderUnavailable {
                provider: PROVIDER,
                reason: format!(
                    "IQAir returned {} for ({lat},{lon}): {}",
                    status,
                    body.chars().take(500).collect::<String>()
                ),
            });
        }

        parse_nearest_city(&body, Utc::now())
    }
}

#[async_trait]
impl AuthoritativeAqiProvider for IqAirClient {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<AuthoritativeReading, Error> {
        self.nearest_city(lat, lon).await
    }
}

/// Map a raw `nearest_city` body into a reading; `now` stamps readings
/// that carry no timestamp of their own.
fn parse_nearest_city(body: &str, now: DateTime<Utc>) -> Result<AuthoritativeReading, Error> {
    let envelope: NearestCityResponse = serde_json::from_str(body)?;

    if envelope.status != "success" {
        let message = envelope
            .data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();
        if message.contains("limit") {
            return Err(Error::RateLimited { provider: PROVIDER });
        }
        return Err(Error::ProviderUnavailable {
            provider: PROVIDER,
            reason: format!("status={} message={}", envelope.status, message),
        });
    }

    let data: NearestCityData = serde_json::from_value(envelope.data.unwrap_or_default())?;
    let pollution = data.current.pollution;

    debug!(
        "IQAir {} ({}): aqius={} p2={:?}",
        data.city,
        data.country,
        pollution.aqius,
        pollution.p2.as_ref().and_then(|p| p.conc)
    );

    Ok(AuthoritativeReading {
        aqi: pollution.aqius,
        pm25: pollution.p2.and_then(|p| p.conc),
        timestamp: pollution.ts.unwrap_or(now),
    })
}
