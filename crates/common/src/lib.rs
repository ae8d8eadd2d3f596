//! Shared types, config, provider capabilities and error definitions for air-sentinel.

pub mod aqi;
pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::AppConfig;
pub use error::Error;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
