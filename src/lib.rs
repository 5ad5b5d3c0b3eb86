//! # skycache
//!
//! A small async service that returns current weather for a list of places,
//! serving recently fetched places from a short-lived in-memory cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use skycache::aggregator::Aggregator;
//! use skycache::app::App;
//! use skycache::cache::ExpiringCache;
//! use skycache::provider::OpenWeatherClient;
//! use skycache::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = OpenWeatherClient::new(
//!         "https://api.openweathermap.org/data/2.5/weather",
//!         "your-api-key",
//!     )?;
//!     let cache = Arc::new(ExpiringCache::new(Duration::from_secs(300)));
//!     let app = App::new(Aggregator::new(cache, provider));
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.run(move |req| {
//!         let app = app.clone();
//!         async move { app.handle(req).await }
//!     }).await?;
//!     Ok(())
//! }
//! ```

// ── Service core ──────────────────────────────────────────────────────────────
pub mod aggregator;
pub mod cache;
pub mod provider;

// ── Request surface ───────────────────────────────────────────────────────────
pub mod app;
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

pub mod config;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use aggregator::{Aggregator, PlaceSummary, ResolveError};
pub use cache::ExpiringCache;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
