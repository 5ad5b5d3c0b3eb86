//! The service's request surface.
//!
//! | Route                   | Response                                           |
//! |-------------------------|----------------------------------------------------|
//! | `GET /weather?city=…`   | JSON array of summaries, one per `city`, in order  |
//! | `GET /weather/:city`    | JSON object for a single place                     |
//! | `GET /health`           | `200 ok`                                           |
//!
//! A batch without any `city` value, or with an empty one, is rejected with
//! `400` before the cache or the provider is touched. Any resolution failure becomes a
//! `500` whose plain-text body is the failure's message.

use std::sync::Arc;

use serde::Serialize;
use tracing::error;

use crate::aggregator::{Aggregator, ResolveError};
use crate::context::Context;
use crate::middleware::{LoggerMiddleware, MiddlewareHandler, Next, endpoint, from_middleware};
use crate::provider::Provider;
use crate::{Request, Response, Router, StatusCode};

/// Query parameter carrying place identifiers.
pub const CITY_PARAM: &str = "city";

/// The assembled service: logging middleware in front of the router.
///
/// Cloning is cheap; clones share the aggregator and its cache.
#[derive(Clone)]
pub struct App {
    pipeline: Arc<[MiddlewareHandler]>,
}

impl App {
    /// Wires the routes to `aggregator`.
    pub fn new<P: Provider>(aggregator: Aggregator<P>) -> Self {
        let aggregator = Arc::new(aggregator);
        let mut router = Router::new();

        {
            let aggregator = Arc::clone(&aggregator);
            router.get("/weather", move |ctx: Context| {
                let aggregator = Arc::clone(&aggregator);
                async move { weather_batch(&aggregator, &ctx).await }
            });
        }
        router.get("/weather/:city", move |ctx: Context| {
            let aggregator = Arc::clone(&aggregator);
            async move { weather_single(&aggregator, &ctx).await }
        });
        router.get("/health", |_ctx: Context| async {
            Response::new(StatusCode::Ok).body("ok")
        });

        let pipeline: Vec<MiddlewareHandler> = vec![
            from_middleware(Arc::new(LoggerMiddleware)),
            endpoint(Arc::new(router)),
        ];

        Self {
            pipeline: pipeline.into(),
        }
    }

    /// Runs `request` through the pipeline.
    pub async fn handle(&self, request: Request) -> Response {
        Next::new(Arc::clone(&self.pipeline))
            .run(Context::new(request))
            .await
    }
}

async fn weather_batch<P: Provider>(aggregator: &Aggregator<P>, ctx: &Context) -> Response {
    let cities = ctx.query_values(CITY_PARAM);
    if cities.is_empty() {
        return Response::new(StatusCode::BadRequest).body("missing city query parameter");
    }
    if cities.iter().any(String::is_empty) {
        return Response::new(StatusCode::BadRequest).body("empty city query parameter");
    }

    match aggregator.resolve(cities.as_slice()).await {
        Ok(summaries) => json(&summaries),
        Err(e) => resolve_failed(&e),
    }
}

async fn weather_single<P: Provider>(aggregator: &Aggregator<P>, ctx: &Context) -> Response {
    let Some(city) = ctx.params().get(CITY_PARAM) else {
        return Response::new(StatusCode::BadRequest).body("missing city");
    };

    match aggregator.resolve_one(city).await {
        Ok(summary) => json(&summary),
        Err(e) => resolve_failed(&e),
    }
}

fn json<T: Serialize + ?Sized>(value: &T) -> Response {
    Response::new(StatusCode::Ok)
        .json(value)
        .unwrap_or_else(|e| Response::new(StatusCode::InternalServerError).body(e.to_string()))
}

fn resolve_failed(e: &ResolveError) -> Response {
    error!(identifier = e.identifier(), error = %e, "weather lookup failed");
    Response::new(StatusCode::InternalServerError).body(e.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::aggregator::PlaceSummary;
    use crate::aggregator::tests::{FakeProvider, report};
    use crate::cache::ExpiringCache;

    fn app(provider: &Arc<FakeProvider>) -> App {
        let cache = Arc::new(ExpiringCache::new(Duration::from_secs(300)));
        App::new(Aggregator::new(cache, Arc::clone(provider)))
    }

    fn request(target: &str) -> Request {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    fn paris_provider() -> Arc<FakeProvider> {
        Arc::new(
            FakeProvider::default()
                .with("Paris", report("Paris", 18.5, &["clear sky"]))
                .with("Oslo", report("Oslo", -3.0, &["snow"])),
        )
    }

    #[tokio::test]
    async fn batch_returns_summaries_in_order() {
        let provider = paris_provider();
        let res = app(&provider)
            .handle(request("/weather?city=Oslo&city=Paris&city=Oslo"))
            .await;

        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("content-type"), Some("application/json"));
        let body: Vec<PlaceSummary> = serde_json::from_slice(res.body_bytes()).unwrap();
        let names: Vec<_> = body.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Oslo", "Paris", "Oslo"]);
        assert_eq!(provider.calls_for("Oslo"), 1);
    }

    #[tokio::test]
    async fn batch_wire_format() {
        let provider = paris_provider();
        let res = app(&provider).handle(request("/weather?city=Paris")).await;
        let body: serde_json::Value = serde_json::from_slice(res.body_bytes()).unwrap();
        assert_eq!(
            body,
            serde_json::json!([{"name": "Paris", "temperature": 18.5, "conditions": "clear sky"}])
        );
    }

    #[tokio::test]
    async fn missing_cities_is_a_client_error_without_upstream_calls() {
        let provider = paris_provider();
        let app = app(&provider);

        for target in ["/weather", "/weather?town=Paris"] {
            let res = app.handle(request(target)).await;
            assert_eq!(res.status(), StatusCode::BadRequest, "{target}");
            assert_eq!(res.body_bytes(), b"missing city query parameter");
        }
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn empty_city_value_rejects_the_whole_batch() {
        let provider = paris_provider();
        let app = app(&provider);

        for target in [
            "/weather?city=Paris&city=&city=Oslo",
            "/weather?city=",
            "/weather?city",
        ] {
            let res = app.handle(request(target)).await;
            assert_eq!(res.status(), StatusCode::BadRequest, "{target}");
            assert_eq!(res.body_bytes(), b"empty city query parameter");
        }
        assert_eq!(provider.total_calls(), 0);
    }

    #[tokio::test]
    async fn failed_batch_is_a_server_error_with_message() {
        let provider = paris_provider();
        let res = app(&provider)
            .handle(request("/weather?city=Paris&city=Atlantis"))
            .await;

        assert_eq!(res.status(), StatusCode::InternalServerError);
        let text = std::str::from_utf8(res.body_bytes()).unwrap();
        assert!(text.contains("Atlantis"));
        assert!(text.contains("404"));
    }

    #[tokio::test]
    async fn single_route_returns_object() {
        let provider = paris_provider();
        let res = app(&provider).handle(request("/weather/Paris")).await;

        assert_eq!(res.status(), StatusCode::Ok);
        let body: PlaceSummary = serde_json::from_slice(res.body_bytes()).unwrap();
        assert_eq!(body.conditions, "clear sky");
    }

    #[tokio::test]
    async fn health_and_unknown_routes() {
        let provider = paris_provider();
        let app = app(&provider);

        assert_eq!(app.handle(request("/health")).await.status(), StatusCode::Ok);
        assert_eq!(app.handle(request("/nope")).await.status(), StatusCode::NotFound);
    }
}
