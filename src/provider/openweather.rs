//! OpenWeatherMap current-weather client.

use reqwest::{Client, Url};
use tracing::debug;

use super::{Provider, ProviderError, Report};

/// Public endpoint of the OpenWeatherMap current-weather API.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Client for the OpenWeatherMap `weather` endpoint.
///
/// The endpoint, key and unit system are injected at construction so that
/// tests can point the client at a local fake.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: Url,
    api_key: String,
    units: String,
}

impl OpenWeatherClient {
    /// Creates a client for `base_url` authenticating with `api_key`.
    ///
    /// Temperatures are requested in metric units; see [`with_units`](Self::with_units).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_client(Client::new(), base_url, api_key)
    }

    /// Same as [`new`](Self::new) but reuses an existing HTTP client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url).map_err(|e| ProviderError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            units: "metric".to_owned(),
        })
    }

    /// Overrides the unit system (`metric`, `imperial` or `standard`).
    #[must_use]
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = units.into();
        self
    }
}

impl Provider for OpenWeatherClient {
    async fn fetch(&self, identifier: &str) -> Result<Report, ProviderError> {
        debug!(identifier, "requesting current weather upstream");

        let response = self
            .client
            .get(self.base_url.clone())
            .query(&[
                ("q", identifier),
                ("units", self.units.as_str()),
                ("appid", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(ProviderError::Unavailable)?;

        let status = response.status();
        let text = response.text().await.map_err(ProviderError::Unavailable)?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}
