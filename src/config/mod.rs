//! Process configuration, read once at startup.
//!
//! Values come from environment variables, optionally seeded from a `.env`
//! file. Every problem found is collected so a misconfigured deployment
//! reports all of them in one go.

use std::time::Duration;

use thiserror::Error;

use crate::aggregator::DEFAULT_UPSTREAM_TIMEOUT;
use crate::cache::{DEFAULT_SWEEP_INTERVAL, DEFAULT_TTL};
use crate::provider::openweather::DEFAULT_BASE_URL;

pub const LISTEN_VAR: &str = "SKYCACHE_LISTEN";
pub const API_KEY_VAR: &str = "OPENWEATHER_API_KEY";
pub const BASE_URL_VAR: &str = "OPENWEATHER_BASE_URL";
pub const UNITS_VAR: &str = "OPENWEATHER_UNITS";
pub const CACHE_TTL_VAR: &str = "SKYCACHE_CACHE_TTL_SECS";
pub const SWEEP_INTERVAL_VAR: &str = "SKYCACHE_SWEEP_INTERVAL_SECS";
pub const UPSTREAM_TIMEOUT_VAR: &str = "SKYCACHE_UPSTREAM_TIMEOUT_SECS";

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const UNIT_SYSTEMS: [&str; 3] = ["metric", "imperial", "standard"];

#[derive(Debug, Error)]
#[error("invalid configuration:\n - {}", .issues.join("\n - "))]
pub struct ConfigError {
    pub issues: Vec<String>,
}

/// Everything the service needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen: String,
    pub api_key: String,
    pub base_url: String,
    pub units: String,
    /// Lifetime of a cached summary.
    pub cache_ttl: Duration,
    /// Interval between background sweeps of expired entries.
    pub sweep_interval: Duration,
    /// Bound on a single upstream call.
    pub upstream_timeout: Duration,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("no .env file loaded: {e}");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut issues = Vec::new();
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let api_key = var(API_KEY_VAR).unwrap_or_else(|| {
            issues.push(format!("{API_KEY_VAR} is required"));
            String::new()
        });

        let units = var(UNITS_VAR).unwrap_or_else(|| "metric".to_owned());
        if !UNIT_SYSTEMS.contains(&units.as_str()) {
            issues.push(format!(
                "{UNITS_VAR} must be one of {}, got {units:?}",
                UNIT_SYSTEMS.join(", ")
            ));
        }

        let mut seconds = |name: &str, default: Duration| match var(name) {
            None => default,
            Some(raw) => match raw.parse::<u64>() {
                Ok(0) | Err(_) => {
                    issues.push(format!("{name} must be a whole number of seconds > 0"));
                    default
                }
                Ok(secs) => Duration::from_secs(secs),
            },
        };

        let cache_ttl = seconds(CACHE_TTL_VAR, DEFAULT_TTL);
        let sweep_interval = seconds(SWEEP_INTERVAL_VAR, DEFAULT_SWEEP_INTERVAL);
        let upstream_timeout = seconds(UPSTREAM_TIMEOUT_VAR, DEFAULT_UPSTREAM_TIMEOUT);

        let config = Self {
            listen: var(LISTEN_VAR).unwrap_or_else(|| DEFAULT_LISTEN.to_owned()),
            api_key,
            base_url: var(BASE_URL_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            units,
            cache_ttl,
            sweep_interval,
            upstream_timeout,
        };

        if issues.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError { issues })
        }
    }
}
