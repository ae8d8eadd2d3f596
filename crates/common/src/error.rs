//! Unified error type for air-sentinel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Place not found: {0}")]
    PlaceNotFound(String),

    #[error("{provider} unavailable: {reason}")]
    ProviderUnavailable { provider: &'static str, reason: String },

    #[error("{provider} rate limited")]
    RateLimited { provider: &'static str },

    #[error("{provider} timed out after {after_ms}ms")]
    Timeout { provider: &'static str, after_ms: u64 },

    #[error("Pollutant data unavailable: {0}")]
    PollutantDataUnavailable(String),

    #[error("Notifier failed for {subscriber}: {reason}")]
    NotifierFailure { subscriber: String, reason: String },

    #[error("Invalid concentration for {pollutant}: {value}")]
    InvalidConcentration { pollutant: &'static str, value: f64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures that the fusion path absorbs by falling back to a
    /// locally calculated AQI.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Error::ProviderUnavailable { .. }
                | Error::RateLimited { .. }
                | Error::Timeout { .. }
                | Error::Http(_)
                | Error::Json(_)
        )
    }
}
