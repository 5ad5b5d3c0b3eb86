//! Cache-backed aggregation of current conditions for many places.
//!
//! [`Aggregator::resolve`] walks the requested identifiers in order. Each one
//! is served from the shared [`ExpiringCache`] when a live entry exists;
//! otherwise the [`Provider`] is asked, the report is normalized into a
//! [`PlaceSummary`], and the summary is written back under the identifier
//! before moving on.
//!
//! Resolution is sequential and fail-fast: the first failure aborts the whole
//! batch and nothing is returned for the identifiers already resolved.
//! Entries cached before the failure stay cached.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::ExpiringCache;
use crate::provider::{Provider, ProviderError, Report};

/// Default bound on a single upstream call.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// Normalized current conditions for one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSummary {
    /// Canonical place name reported by the provider.
    pub name: String,
    /// Current temperature in the provider's configured units.
    pub temperature: f64,
    /// Description of the primary condition, e.g. `"clear sky"`.
    pub conditions: String,
}

impl PlaceSummary {
    /// Normalizes a provider report.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NormalizationFault`] if the report carries no
    /// condition entries.
    pub fn from_report(identifier: &str, report: Report) -> Result<Self, ResolveError> {
        let Report { name, main, weather } = report;

        let conditions = weather
            .into_iter()
            .next()
            .map(|condition| condition.description)
            .ok_or_else(|| ResolveError::NormalizationFault {
                identifier: identifier.to_owned(),
                reason: "condition list is empty".to_owned(),
            })?;

        Ok(Self {
            name,
            temperature: main.temp,
            conditions,
        })
    }
}

/// Reasons a batch resolution fails.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("weather provider unreachable for {identifier:?}: {source}")]
    UpstreamUnavailable {
        identifier: String,
        #[source]
        source: ProviderError,
    },

    #[error("weather provider returned an invalid response for {identifier:?}: {source}")]
    UpstreamResponseInvalid {
        identifier: String,
        #[source]
        source: ProviderError,
    },

    #[error("weather provider timed out after {timeout:?} for {identifier:?}")]
    UpstreamTimeout { identifier: String, timeout: Duration },

    #[error("incomplete weather report for {identifier:?}: {reason}")]
    NormalizationFault { identifier: String, reason: String },
}

impl ResolveError {
    /// Classifies a provider failure for `identifier`.
    fn from_provider(identifier: &str, source: ProviderError) -> Self {
        let identifier = identifier.to_owned();
        match source {
            ProviderError::Unavailable(_) | ProviderError::InvalidBaseUrl { .. } => {
                Self::UpstreamUnavailable { identifier, source }
            }
            ProviderError::Status { .. } | ProviderError::Decode(_) => {
                Self::UpstreamResponseInvalid { identifier, source }
            }
        }
    }

    /// Returns the identifier whose resolution failed.
    pub fn identifier(&self) -> &str {
        match self {
            Self::UpstreamUnavailable { identifier, .. }
            | Self::UpstreamResponseInvalid { identifier, .. }
            | Self::UpstreamTimeout { identifier, .. }
            | Self::NormalizationFault { identifier, .. } => identifier,
        }
    }
}

/// Resolves place identifiers through a shared cache and an upstream provider.
///
/// Cloning an `Aggregator` is cheap; clones share the cache and provider.
#[derive(Debug)]
pub struct Aggregator<P> {
    cache: Arc<ExpiringCache<PlaceSummary>>,
    provider: Arc<P>,
    upstream_timeout: Duration,
}

impl<P> Clone for Aggregator<P> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            provider: Arc::clone(&self.provider),
            upstream_timeout: self.upstream_timeout,
        }
    }
}

impl<P: Provider> Aggregator<P> {
    /// Creates an aggregator over `cache` and `provider`.
    pub fn new(cache: Arc<ExpiringCache<PlaceSummary>>, provider: P) -> Self {
        Self {
            cache,
            provider: Arc::new(provider),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }

    /// Bounds every upstream call by `timeout`.
    #[must_use]
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    /// Returns the shared cache.
    pub fn cache(&self) -> &Arc<ExpiringCache<PlaceSummary>> {
        &self.cache
    }

    /// Resolves every identifier in order, one at a time.
    ///
    /// Duplicates are resolved independently, so the result always has the
    /// same length and order as `identifiers`. A repeated identifier that
    /// missed the cache the first time hits it the second time.
    ///
    /// # Errors
    ///
    /// Returns the first [`ResolveError`] encountered; no partial result is
    /// produced.
    pub async fn resolve<S>(&self, identifiers: &[S]) -> Result<Vec<PlaceSummary>, ResolveError>
    where
        S: AsRef<str> + Sync,
    {
        let mut summaries = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            summaries.push(self.resolve_one(identifier.as_ref()).await?);
        }
        Ok(summaries)
    }

    /// Resolves a single identifier through the cache.
    ///
    /// # Errors
    ///
    /// See [`resolve`](Self::resolve).
    pub async fn resolve_one(&self, identifier: &str) -> Result<PlaceSummary, ResolveError> {
        if let Some(summary) = self.cache.get(identifier) {
            debug!(identifier, "cache hit");
            return Ok(summary);
        }

        debug!(identifier, "cache miss");
        let summary = self.fetch(identifier).await.inspect_err(|e| {
            warn!(identifier, error = %e, "upstream resolution failed");
        })?;

        self.cache.set_default(identifier, summary.clone());
        Ok(summary)
    }

    async fn fetch(&self, identifier: &str) -> Result<PlaceSummary, ResolveError> {
        let report = tokio::time::timeout(self.upstream_timeout, self.provider.fetch(identifier))
            .await
            .map_err(|_| ResolveError::UpstreamTimeout {
                identifier: identifier.to_owned(),
                timeout: self.upstream_timeout,
            })?
            .map_err(|e| ResolveError::from_provider(identifier, e))?;

        PlaceSummary::from_report(identifier, report)
    }
}
