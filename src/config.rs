//! Configuration loader: .env file, optional config.toml, then env vars.

use common::config::{AppConfig, MAX_CACHE_TTL_SECS, MAX_WINDOW_SECS};
use common::Error;
use std::collections::HashSet;
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.allowed_places.is_empty() {
        issues.push("allowed_places must contain at least one place".into());
    }
    if config.places.is_empty() {
        issues.push("places must contain at least one place".into());
    }

    if config.resolver.min_query_chars == 0 {
        issues.push("resolver.min_query_chars must be > 0".into());
    }
    if config.resolver.min_prefix_chars < config.resolver.min_query_chars {
        issues.push("resolver.min_prefix_chars must be >= resolver.min_query_chars".into());
    }

    if config.cache.ttl_secs == 0 || config.cache.ttl_secs > MAX_CACHE_TTL_SECS {
        issues.push(format!("cache.ttl_secs must be in 1..={MAX_CACHE_TTL_SECS}"));
    }
    if config.cache.coordinate_precision > 6 {
        issues.push("cache.coordinate_precision must be <= 6".into());
    }

    if config.providers.timeout_ms == 0 {
        issues.push("providers.timeout_ms must be > 0".into());
    }
    if config.providers.iqair_requests_per_minute == 0 {
        issues.push("providers.iqair_requests_per_minute must be > 0".into());
    }

    let windows = [
        ("hazardous_window_secs", config.throttle.hazardous_window_secs),
        ("very_unhealthy_window_secs", config.throttle.very_unhealthy_window_secs),
        ("unhealthy_window_secs", config.throttle.unhealthy_window_secs),
    ];
    for (name, value) in windows {
        if value == 0 || value > MAX_WINDOW_SECS {
            issues.push(format!("throttle.{name} must be in 1..={MAX_WINDOW_SECS}"));
        }
    }
    if config.throttle.hazardous_window_secs > config.throttle.unhealthy_window_secs {
        issues.push(
            "throttle.hazardous_window_secs must be <= throttle.unhealthy_window_secs".into(),
        );
    }
    if config.throttle.notifier_timeout_ms == 0 {
        issues.push("throttle.notifier_timeout_ms must be > 0".into());
    }

    if config.timing.watch_interval_secs == 0 {
        issues.push("timing.watch_interval_secs must be > 0".into());
    }

    let mut seen = HashSet::new();
    for sub in &config.subscriptions {
        if !seen.insert(sub.id) {
            issues.push(format!("subscription id {} is duplicated", sub.id.0));
        }
        if sub.subscriber.trim().is_empty() {
            issues.push(format!("subscription {} has an empty subscriber", sub.id.0));
        }
        if !(0.0..=500.0).contains(&sub.threshold) {
            issues.push(format!(
                "subscription {} threshold must be in [0,500]",
                sub.id.0
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides; `lookup` stands in for `std::env::var`.
fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(key) = lookup("IQAIR_API_KEY") {
        config.iqair_api_key = key;
    }
    if let Some(key) = lookup("OPENWEATHER_API_KEY") {
        config.openweather_api_key = key;
    }
    if let Some(raw) = lookup("AQI_CACHE_TTL_SECS") {
        config.cache.ttl_secs = parse_positive_u64(&raw, "AQI_CACHE_TTL_SECS")?;
    }
    if let Some(raw) = lookup("AQI_PROVIDER_TIMEOUT_MS") {
        config.providers.timeout_ms = parse_positive_u64(&raw, "AQI_PROVIDER_TIMEOUT_MS")?;
    }
    if let Some(raw) = lookup("AQI_WATCH_INTERVAL_SECS") {
        config.timing.watch_interval_secs = parse_positive_u64(&raw, "AQI_WATCH_INTERVAL_SECS")?;
    }
    if let Some(raw) = lookup("AQI_PLACES") {
        let places = parse_list(&raw);
        if !places.is_empty() {
            config.places = places;
        }
    }
    Ok(())
}

/// Load configuration from environment and an optional TOML file.
pub fn load_config(config_path: &Path) -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Defaults, replaced wholesale by the file when present.
    let mut config = AppConfig::default();
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", config_path.display(), e))
        })?;
        config = toml::from_str(&contents).map_err(|e| {
            Error::Config(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
    }

    // 3. Environment variables win.
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    // 4. Required keys.
    if config.iqair_api_key.trim().is_empty() {
        return Err(Error::Config(
            "IQAIR_API_KEY is required (set in .env or environment)".into(),
        ));
    }
    if config.openweather_api_key.trim().is_empty() {
        return Err(Error::Config(
            "OPENWEATHER_API_KEY is required (set in .env or environment)".into(),
        ));
    }

    validate_config(&config)?;

    Ok(config)
}
