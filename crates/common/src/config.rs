//! Application configuration types.

use serde::{Deserialize, Serialize};

use crate::types::Subscription;

/// Longest accepted cache entry lifetime (one week).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 86_400;

/// Longest accepted throttle window (ten years).
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 86_400;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// IQAir API key (authoritative AQI).
    #[serde(default)]
    pub iqair_api_key: String,

    /// OpenWeather API key (geocoding + pollutant detail).
    #[serde(default)]
    pub openweather_api_key: String,

    /// Places checked by watch and ranking modes.
    #[serde(default = "default_places")]
    pub places: Vec<String>,

    /// Recognized major place names; anything else never reaches the geocoder.
    #[serde(default = "default_allowed_places")]
    pub allowed_places: Vec<String>,

    /// Place-name matching rules.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Fusion cache parameters.
    #[serde(default)]
    pub cache: CacheConfig,

    /// External provider parameters.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Alert throttle windows.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Timing parameters (seconds).
    #[serde(default)]
    pub timing: TimingConfig,

    /// Subscriptions seeded into the in-memory store.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

/// Place resolver thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Queries shorter than this (after trimming) are rejected outright.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,

    /// Minimum query length for the prefix-match rule.
    #[serde(default = "default_min_prefix_chars")]
    pub min_prefix_chars: usize,
}

/// Fusion cache parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of both positive and negative entries.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Decimal places coordinates are rounded to when building cache keys.
    #[serde(default = "default_coordinate_precision")]
    pub coordinate_precision: u32,
}

/// External provider parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Upper bound on any single provider call.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,

    /// Client-side budget for authoritative AQI calls.
    #[serde(default = "default_iqair_requests_per_minute")]
    pub iqair_requests_per_minute: u32,

    #[serde(default = "default_iqair_base_url")]
    pub iqair_base_url: String,

    #[serde(default = "default_openweather_base_url")]
    pub openweather_base_url: String,
}

/// Minimum time between two alerts to one subscriber, per severity tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_hazardous_window")]
    pub hazardous_window_secs: u64,

    #[serde(default = "default_very_unhealthy_window")]
    pub very_unhealthy_window_secs: u64,

    #[serde(default = "default_unhealthy_window")]
    pub unhealthy_window_secs: u64,

    /// Upper bound on a single notifier call.
    #[serde(default = "default_notifier_timeout_ms")]
    pub notifier_timeout_ms: u64,
}

/// Timing configuration (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Interval between watch-mode sweeps.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_min_query_chars() -> usize {
    4
}
fn default_min_prefix_chars() -> usize {
    6
}

fn default_cache_ttl() -> u64 {
    600
}
fn default_coordinate_precision() -> u32 {
    2
}

fn default_provider_timeout_ms() -> u64 {
    8_000
}
fn default_iqair_requests_per_minute() -> u32 {
    5
}
fn default_iqair_base_url() -> String {
    "http://api.airvisual.com/v2".into()
}
fn default_openweather_base_url() -> String {
    "http://api.openweathermap.org".into()
}

fn default_hazardous_window() -> u64 {
    6 * 3600
}
fn default_very_unhealthy_window() -> u64 {
    24 * 3600
}
fn default_unhealthy_window() -> u64 {
    24 * 3600
}
fn default_notifier_timeout_ms() -> u64 {
    10_000
}

fn default_watch_interval() -> u64 {
    900
}

fn default_places() -> Vec<String> {
    [
        "Lahore", "Karachi", "Delhi", "Beijing", "Dubai", "London", "Paris", "New York",
        "Los Angeles", "Cairo", "Bangkok", "Jakarta", "Tokyo", "Seoul",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_allowed_places() -> Vec<String> {
    [
        // Pakistan
        "lahore", "karachi", "islamabad", "rawalpindi", "faisalabad", "multan", "peshawar",
        "quetta",
        // India
        "delhi", "mumbai", "bangalore", "hyderabad", "chennai", "kolkata", "pune", "ahmedabad",
        "jaipur",
        // China
        "beijing", "shanghai", "guangzhou", "shenzhen", "chengdu", "wuhan", "hangzhou",
        // Japan
        "tokyo", "osaka", "kyoto", "yokohama", "nagoya", "sapporo", "fukuoka",
        // Middle East
        "dubai", "abu dhabi", "riyadh", "jeddah", "doha", "kuwait city", "baghdad", "tehran",
        "istanbul",
        // Europe
        "london", "paris", "berlin", "madrid", "rome", "barcelona", "amsterdam", "vienna",
        "prague", "brussels", "zurich", "geneva", "milan", "athens", "lisbon", "copenhagen",
        "stockholm", "oslo", "helsinki", "warsaw", "budapest", "dublin", "edinburgh",
        "manchester",
        // Americas
        "new york", "los angeles", "chicago", "houston", "phoenix", "philadelphia",
        "san antonio", "san diego", "dallas", "san jose", "austin", "miami", "seattle", "boston",
        "san francisco", "toronto", "montreal", "vancouver", "calgary", "mexico city",
        "guadalajara", "monterrey", "buenos aires", "sao paulo", "rio de janeiro", "lima",
        "bogota", "santiago",
        // Southeast Asia
        "singapore", "bangkok", "jakarta", "manila", "kuala lumpur", "hanoi", "ho chi minh city",
        // Oceania
        "sydney", "melbourne", "brisbane", "perth", "adelaide", "auckland", "wellington",
        // Africa
        "cairo", "johannesburg", "cape town", "lagos", "nairobi", "casablanca",
        // Russia
        "moscow", "st petersburg", "novosibirsk",
        // Korea
        "seoul", "busan", "incheon",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_query_chars: default_min_query_chars(),
            min_prefix_chars: default_min_prefix_chars(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            coordinate_precision: default_coordinate_precision(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_provider_timeout_ms(),
            iqair_requests_per_minute: default_iqair_requests_per_minute(),
            iqair_base_url: default_iqair_base_url(),
            openweather_base_url: default_openweather_base_url(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            hazardous_window_secs: default_hazardous_window(),
            very_unhealthy_window_secs: default_very_unhealthy_window(),
            unhealthy_window_secs: default_unhealthy_window(),
            notifier_timeout_ms: default_notifier_timeout_ms(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: default_watch_interval(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            iqair_api_key: String::new(),
            openweather_api_key: String::new(),
            places: default_places(),
            allowed_places: default_allowed_places(),
            resolver: ResolverConfig::default(),
            cache: CacheConfig::default(),
            providers: ProvidersConfig::default(),
            throttle: ThrottleConfig::default(),
            timing: TimingConfig::default(),
            subscriptions: Vec::new(),
        }
    }
}
