//! Upstream weather provider boundary.
//!
//! The [`Provider`] trait is the seam between the aggregator and the network:
//! production code uses [`OpenWeatherClient`], tests substitute an
//! in-process fake. A provider returns the raw [`Report`] document; turning it
//! into a [`PlaceSummary`](crate::aggregator::PlaceSummary) is the
//! aggregator's job.

use std::future::Future;

use serde::Deserialize;
use thiserror::Error;

pub mod openweather;

pub use openweather::OpenWeatherClient;

/// Errors produced while talking to the upstream provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("upstream request failed: {0}")]
    Unavailable(#[source] reqwest::Error),

    #[error("upstream responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("upstream body could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid upstream base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Fetches the current-conditions report for one place identifier.
pub trait Provider: Send + Sync + 'static {
    /// Looks up `identifier` upstream.
    ///
    /// Dropping the returned future abandons the request.
    fn fetch(&self, identifier: &str) -> impl Future<Output = Result<Report, ProviderError>> + Send;
}

/// The provider's current-weather document, reduced to the fields we read.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Report {
    /// Canonical place name as the provider spells it.
    pub name: String,
    pub main: Readings,
    /// Ordered condition entries; the first is the primary one.
    pub weather: Vec<Condition>,
}

/// Numeric readings in the units requested from the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Readings {
    pub temp: f64,
    #[serde(default)]
    pub temp_min: f64,
    #[serde(default)]
    pub temp_max: f64,
    #[serde(default)]
    pub pressure: f64,
    #[serde(default)]
    pub humidity: f64,
}

/// One condition entry, e.g. `{"main": "Clear", "description": "clear sky"}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Condition {
    /// Short condition group.
    #[serde(default)]
    pub main: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}
