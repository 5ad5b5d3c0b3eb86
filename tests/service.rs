//! End-to-end: TCP client → Server → App → Aggregator → OpenWeatherClient →
//! fake upstream (another Server instance serving canned documents).

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use skycache::aggregator::Aggregator;
use skycache::app::App;
use skycache::cache::ExpiringCache;
use skycache::provider::OpenWeatherClient;
use skycache::{PlaceSummary, Request, Response, Server, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const PARIS: &str =
    r#"{"name":"Paris","main":{"temp":18.5},"weather":[{"main":"Clear","description":"clear sky"}]}"#;
const OSLO: &str =
    r#"{"name":"Oslo","main":{"temp":-3.0},"weather":[{"main":"Snow","description":"light snow"}]}"#;
const NO_CONDITIONS: &str = r#"{"name":"Nowhere","main":{"temp":1.0},"weather":[]}"#;

struct Upstream {
    base_url: String,
    hits: Arc<AtomicUsize>,
}

async fn spawn_upstream() -> Upstream {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(server.run(move |req: Request| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let body = match req.query_param("q") {
                Some("Paris") => PARIS,
                Some("Oslo") => OSLO,
                Some("Nowhere") => NO_CONDITIONS,
                _ => {
                    return Response::new(StatusCode::NotFound)
                        .body(r#"{"cod":"404","message":"city not found"}"#);
                }
            };
            Response::new(StatusCode::Ok)
                .header("Content-Type", "application/json")
                .body(body)
        }
    }));

    Upstream {
        base_url: format!("http://{addr}/data/2.5/weather"),
        hits,
    }
}

async fn spawn_service(upstream: &Upstream) -> SocketAddr {
    let provider = OpenWeatherClient::new(&upstream.base_url, "test-key").unwrap();
    let cache = Arc::new(ExpiringCache::new(Duration::from_secs(300)));
    let app = App::new(Aggregator::new(cache, provider).with_upstream_timeout(Duration::from_secs(5)));

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run(move |req| {
        let app = app.clone();
        async move { app.handle(req).await }
    }));
    addr
}

/// Sends one request and returns `(status line, body)`.
async fn get(addr: SocketAddr, target: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    let text = String::from_utf8(out).unwrap();

    let (head, body) = text.split_once("\r\n\r\n").unwrap();
    let status = head.lines().next().unwrap().to_owned();
    (status, body.to_owned())
}

#[tokio::test]
async fn cold_then_warm_lookup() {
    let upstream = spawn_upstream().await;
    let addr = spawn_service(&upstream).await;

    let (status, body) = get(addr, "/weather?city=Paris").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    let summaries: Vec<PlaceSummary> = serde_json::from_str(&body).unwrap();
    assert_eq!(
        summaries,
        vec![PlaceSummary {
            name: "Paris".to_owned(),
            temperature: 18.5,
            conditions: "clear sky".to_owned(),
        }]
    );

    let (_, again) = get(addr, "/weather?city=Paris").await;
    assert_eq!(again, body);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_preserves_order_and_duplicates() {
    let upstream = spawn_upstream().await;
    let addr = spawn_service(&upstream).await;

    let (status, body) = get(addr, "/weather?city=Oslo&city=Paris&city=Oslo").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    let summaries: Vec<PlaceSummary> = serde_json::from_str(&body).unwrap();
    let names: Vec<_> = summaries.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Oslo", "Paris", "Oslo"]);
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_cities_is_rejected_before_upstream() {
    let upstream = spawn_upstream().await;
    let addr = spawn_service(&upstream).await;

    let (status, body) = get(addr, "/weather").await;
    assert_eq!(status, "HTTP/1.1 400 Bad Request");
    assert_eq!(body, "missing city query parameter");
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_city_fails_the_whole_batch() {
    let upstream = spawn_upstream().await;
    let addr = spawn_service(&upstream).await;

    let (status, body) = get(addr, "/weather?city=Paris&city=Atlantis&city=Oslo").await;
    assert_eq!(status, "HTTP/1.1 500 Internal Server Error");
    assert!(body.contains("Atlantis"), "{body}");
    assert!(!body.contains("clear sky"));
    // Oslo was never requested.
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);

    // Paris was cached before the failure.
    let (status, _) = get(addr, "/weather?city=Paris").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(upstream.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn empty_condition_list_is_a_server_error() {
    let upstream = spawn_upstream().await;
    let addr = spawn_service(&upstream).await;

    let (status, body) = get(addr, "/weather?city=Nowhere").await;
    assert_eq!(status, "HTTP/1.1 500 Internal Server Error");
    assert!(body.contains("condition list is empty"), "{body}");
}

#[tokio::test]
async fn single_city_route() {
    let upstream = spawn_upstream().await;
    let addr = spawn_service(&upstream).await;

    let (status, body) = get(addr, "/weather/Oslo").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    let summary: PlaceSummary = serde_json::from_str(&body).unwrap();
    assert_eq!(summary.conditions, "light snow");
}
