use std::sync::Arc;

use skycache::aggregator::Aggregator;
use skycache::app::App;
use skycache::cache::{self, ExpiringCache};
use skycache::config::Config;
use skycache::provider::OpenWeatherClient;
use skycache::server::Server;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!(
        listen = %config.listen,
        upstream = %config.base_url,
        ttl = ?config.cache_ttl,
        sweep = ?config.sweep_interval,
        "starting skycache"
    );

    let provider =
        OpenWeatherClient::new(&config.base_url, config.api_key.as_str())?.with_units(config.units.as_str());

    let cache = Arc::new(ExpiringCache::new(config.cache_ttl));
    let janitor = cache::spawn_janitor(&cache, config.sweep_interval);

    let aggregator = Aggregator::new(cache, provider).with_upstream_timeout(config.upstream_timeout);
    let app = App::new(aggregator);

    let server = Server::bind(&config.listen).await?;
    server
        .run_until(
            move |req| {
                let app = app.clone();
                async move { app.handle(req).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            },
        )
        .await?;

    janitor.abort();
    Ok(())
}
