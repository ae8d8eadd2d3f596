//! OpenWeather API client.
//!
//! Two capabilities share one HTTP client and API key:
//! direct geocoding (`/geo/1.0/direct`) and the air pollution breakdown
//! (`/data/2.5/air_pollution`). Neither reports a US AQI; the pollution
//! endpoint's own 1–5 index is ignored.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use common::config::ProvidersConfig;
use common::provider::{GeocodeProvider, PollutantDetailProvider};
use common::{Error, GeocodeCandidate, PollutantSample};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

const PROVIDER: &str = "OpenWeather";

/// OpenWeather API client.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

// ── OpenWeather response types ────────────────────────────────────────

/// One entry of the `/geo/1.0/direct` array.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoDirectEntry {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Response from `/data/2.5/air_pollution`.
#[derive(Debug, Deserialize)]
pub struct AirPollutionResponse {
    #[serde(default)]
    pub list: Vec<AirPollutionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AirPollutionEntry {
    /// Unix seconds.
    #[serde(default)]
    pub dt: Option<i64>,
    #[serde(default)]
    pub components: Components,
}

/// Concentrations in µg/m³; missing keys default to zero here, at the boundary.
#[derive(Debug, Default, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub co: f64,
    #[serde(default)]
    pub no: f64,
    #[serde(default)]
    pub no2: f64,
    #[serde(default)]
    pub o3: f64,
    #[serde(default)]
    pub so2: f64,
    #[serde(default)]
    pub pm2_5: f64,
    #[serde(default)]
    pub pm10: f64,
    #[serde(default)]
    pub nh3: f64,
}

// ── Implementation ────────────────────────────────────────────────────

impl OpenWeatherClient {
    pub fn new(api_key: String, providers: &ProvidersConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent("air-sentinel/0.1")
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_millis(providers.timeout_ms))
            .build()
            .map_err(|e| Error::Http(format!("failed to build OpenWeather HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: providers.openweather_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching OpenWeather {}: {}", what, url);

        let resp = self
            .client
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable {
                provider: PROVIDER,
                reason: format!("HTTP error for {what}: {e}"),
            })?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(Error::RateLimited { provider: PROVIDER });
        }
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderUnavailable {
                provider: PROVIDER,
                reason: format!(
                    "OpenWeather returned {} for {}: {}",
                    status,
                    what,
                    body.chars().take(500).collect::<String>()
                ),
            });
        }

        resp.json().await.map_err(|e| Error::ProviderUnavailable {
            provider: PROVIDER,
            reason: format!("JSON parse error for {what}: {e}"),
        })
    }

    /// Best geocoding candidate for a free-text name.
    pub async fn geocode(&self, name: &str) -> Result<Option<GeocodeCandidate>, Error> {
        let entries: Vec<GeoDirectEntry> = self
            .get_json(
                "/geo/1.0/direct",
                &[("q", name.to_string()), ("limit", "1".to_string())],
                &format!("geocode '{name}'"),
            )
            .await?;

        Ok(best_candidate(entries))
    }

    /// Current pollutant breakdown at a coordinate pair.
    pub async fn current_pollution(&self, lat: f64, lon: f64) -> Result<PollutantSample, Error> {
        let resp: AirPollutionResponse = self
            .get_json(
                "/data/2.5/air_pollution",
                &[("lat", lat.to_string()), ("lon", lon.to_string())],
                &format!("air pollution ({lat},{lon})"),
            )
            .await?;

        to_sample(resp, Utc::now())
    }
}

#[async_trait]
impl GeocodeProvider for OpenWeatherClient {
    async fn lookup(&self, name: &str) -> Result<Option<GeocodeCandidate>, Error> {
        self.geocode(name).await
    }
}

#[async_trait]
impl PollutantDetailProvider for OpenWeatherClient {
    async fn fetch(&self, lat: f64, lon: f64) -> Result<PollutantSample, Error> {
        self.current_pollution(lat, lon).await
    }
}

fn best_candidate(entries: Vec<GeoDirectEntry>) -> Option<GeocodeCandidate> {
    entries.into_iter().next().map(|e| GeocodeCandidate {
        matched_name: e.name,
        lat: e.lat,
        lon: e.lon,
        country: e.country.unwrap_or_else(|| "Unknown".into()),
    })
}

fn to_sample(resp: AirPollutionResponse, now: DateTime<Utc>) -> Result<PollutantSample, Error> {
    let entry = resp
        .list
        .into_iter()
        .next()
        .ok_or_else(|| Error::PollutantDataUnavailable("empty air pollution list".into()))?;

    let captured_at = entry
        .dt
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or(now);
    let c = entry.components;

    PollutantSample {
        co: c.co,
        no: c.no,
        no2: c.no2,
        o3: c.o3,
        so2: c.so2,
        pm25: c.pm2_5,
        pm10: c.pm10,
        nh3: c.nh3,
        captured_at,
    }
    .validated()
}
