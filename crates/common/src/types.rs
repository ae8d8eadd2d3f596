//! Domain types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

// ── Pollutants ────────────────────────────────────────────────────────

/// One reading of pollutant concentrations (µg/m³) for a location.
///
/// Fields absent from a provider payload are zeroed when the sample is built
/// at the client boundary; calculation code never sees missing values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollutantSample {
    pub co: f64,
    pub no: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: f64,
    pub pm25: f64,
    pub pm10: f64,
    pub nh3: f64,
    pub captured_at: DateTime<Utc>,
}

impl PollutantSample {
    /// Reject negative or non-finite concentrations.
    pub fn validated(self) -> Result<Self> {
        let fields = [
            ("co", self.co),
            ("no", self.no),
            ("no2", self.no2),
            ("o3", self.o3),
            ("so2", self.so2),
            ("pm2.5", self.pm25),
            ("pm10", self.pm10),
            ("nh3", self.nh3),
        ];
        for (pollutant, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConcentration { pollutant, value });
            }
        }
        Ok(self)
    }

    /// Copy of this sample with PM2.5 replaced.
    pub fn with_pm25(self, pm25: f64) -> Self {
        Self { pm25, ..self }
    }
}

// ── AQI ───────────────────────────────────────────────────────────────

/// US EPA health category for an AQI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitive => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Map colour used by the dashboard layer.
    pub fn color(self) -> &'static str {
        match self {
            AqiCategory::Good => "green",
            AqiCategory::Moderate => "yellow",
            AqiCategory::UnhealthyForSensitive => "orange",
            AqiCategory::Unhealthy => "red",
            AqiCategory::VeryUnhealthy => "purple",
            AqiCategory::Hazardous => "maroon",
        }
    }

    pub fn health_message(self) -> &'static str {
        match self {
            AqiCategory::Good => "Air quality is satisfactory",
            AqiCategory::Moderate => "Acceptable air quality",
            AqiCategory::UnhealthyForSensitive => "Sensitive groups may experience health effects",
            AqiCategory::Unhealthy => "Everyone may experience health effects",
            AqiCategory::VeryUnhealthy => "Health alert: everyone may experience serious effects",
            AqiCategory::Hazardous => "Health warning: emergency conditions",
        }
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where an AQI value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiSource {
    /// Reported directly by the authoritative provider.
    Authoritative,
    /// Derived locally from PM2.5 via the breakpoint table.
    Calculated,
}

impl fmt::Display for AqiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AqiSource::Authoritative => f.write_str("authoritative"),
            AqiSource::Calculated => f.write_str("calculated"),
        }
    }
}

/// Canonical AQI for a place at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AqiScore {
    pub value: f64,
    pub category: AqiCategory,
    pub source: AqiSource,
}

impl AqiScore {
    pub fn new(value: f64, source: AqiSource) -> Self {
        Self {
            value,
            category: crate::aqi::category_for(value),
            source,
        }
    }

    /// Value rounded to one decimal place for display.
    pub fn rounded(&self) -> f64 {
        (self.value * 10.0).round() / 10.0
    }
}

// ── Places ────────────────────────────────────────────────────────────

/// A resolved place with authoritative coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

impl Place {
    /// Placeholder at (0,0) pending resolution; never handed to providers.
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            country: "Unknown".into(),
            lat: 0.0,
            lon: 0.0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !(self.lat == 0.0 && self.lon == 0.0)
    }
}

/// Best candidate returned by a geocoding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub matched_name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: String,
}

/// A reading from the authoritative AQI provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeReading {
    pub aqi: f64,
    /// Provider's own PM2.5 concentration, when it reports one.
    pub pm25: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl AuthoritativeReading {
    /// A zero or out-of-range AQI is treated as "no value".
    pub fn is_usable(&self) -> bool {
        self.aqi.is_finite() && self.aqi > 0.0 && self.aqi <= 500.0
    }

    pub fn usable_pm25(&self) -> Option<f64> {
        self.pm25.filter(|v| v.is_finite() && *v > 0.0)
    }
}

// ── Subscriptions & alerts ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A subscriber's request to be alerted about a place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    /// Subscriber identity (an email address in practice).
    pub subscriber: String,
    /// Canonical place name.
    pub place: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub last_alert_sent: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

fn default_threshold() -> f64 {
    150.0
}

impl Subscription {
    pub fn targets(&self, place: &Place) -> bool {
        self.place.eq_ignore_ascii_case(&place.name)
    }
}

/// Alert severity; only AQI ≥ 150 ever alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl SeverityTier {
    pub fn from_aqi(aqi: f64) -> Option<Self> {
        if aqi >= 300.0 {
            Some(SeverityTier::Hazardous)
        } else if aqi >= 200.0 {
            Some(SeverityTier::VeryUnhealthy)
        } else if aqi >= 150.0 {
            Some(SeverityTier::Unhealthy)
        } else {
            None
        }
    }

    pub fn headline(self) -> &'static str {
        match self {
            SeverityTier::Unhealthy => "UNHEALTHY",
            SeverityTier::VeryUnhealthy => "VERY UNHEALTHY",
            SeverityTier::Hazardous => "HAZARDOUS",
        }
    }

    pub fn advisory(self) -> &'static str {
        match self {
            SeverityTier::Unhealthy => "Everyone may begin to experience health effects.",
            SeverityTier::VeryUnhealthy => {
                "Health alert: everyone may experience more serious health effects."
            }
            SeverityTier::Hazardous => {
                "Emergency conditions! Everyone should avoid all outdoor exertion."
            }
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.headline())
    }
}

/// Why the throttle engine decided what it did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    ThresholdNotMet { threshold: f64 },
    BelowAlertFloor,
    FirstAlert,
    WindowElapsed { elapsed_secs: i64 },
    Throttled { remaining_secs: i64 },
}

/// Result of handing a send decision to the notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    Delivered,
    Failed { reason: String },
}

/// The throttle engine's verdict for one subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchDecision {
    pub subscription_id: SubscriptionId,
    pub subscriber: String,
    pub tier: Option<SeverityTier>,
    pub should_send: bool,
    pub reason: DecisionReason,
    /// Present only when `should_send` is true.
    pub delivery: Option<Delivery>,
}

/// Rendered alert message handed to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotice {
    pub subscriber: String,
    pub place_name: String,
    pub aqi: f64,
    pub tier: SeverityTier,
    pub category: AqiCategory,
    pub pm25: f64,
    pub pm10: f64,
}

impl AlertNotice {
    /// Build a notice; `None` when the score is below every alerting tier.
    pub fn new(
        subscriber: &str,
        place_name: &str,
        score: &AqiScore,
        sample: &PollutantSample,
    ) -> Option<Self> {
        let tier = SeverityTier::from_aqi(score.value)?;
        Some(Self {
            subscriber: subscriber.to_string(),
            place_name: place_name.to_string(),
            aqi: score.rounded(),
            tier,
            category: score.category,
            pm25: (sample.pm25 * 100.0).round() / 100.0,
            pm10: (sample.pm10 * 100.0).round() / 100.0,
        })
    }

    pub fn subject(&self) -> String {
        format!(
            "Air Quality Alert: {} in {}",
            self.tier.headline(),
            self.place_name
        )
    }

    pub fn body(&self) -> String {
        format!(
            "Air Quality Alert for {place}\n\n\
             Status: {headline} ({category})\n\
             Current AQI: {aqi}\n\n\
             Air Quality Details:\n\
             - PM2.5: {pm25} µg/m³\n\
             - PM10: {pm10} µg/m³\n\n\
             Health Advisory:\n{advisory}\n\n\
             Recommendations:\n\
             - Avoid prolonged outdoor activities\n\
             - Keep windows closed\n\
             - Use air purifiers if available\n\
             - Wear N95 masks if you must go outside\n",
            place = self.place_name,
            headline = self.tier.headline(),
            category = self.category,
            aqi = self.aqi,
            pm25 = self.pm25,
            pm10 = self.pm10,
            advisory = self.tier.advisory(),
        )
    }
}

// ── Forecasts ─────────────────────────────────────────────────────────

/// One day of forecast output from a forecast provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date: chrono::NaiveDate,
    pub predicted_aqi: f64,
    pub confidence: f64,
}

/// A forecast point with its category attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledForecast {
    pub date: chrono::NaiveDate,
    pub predicted_aqi: f64,
    pub confidence: f64,
    pub category: AqiCategory,
}
