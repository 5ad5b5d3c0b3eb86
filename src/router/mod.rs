//! Request routing — map URL patterns and HTTP methods to handler functions.
//!
//! Two pattern styles are supported:
//!
//! | Pattern              | Example match              | Captured params     |
//! |----------------------|----------------------------|---------------------|
//! | `/weather`           | `/weather`                 | *(none)*            |
//! | `/weather/:city`     | `/weather/Paris`           | `city → "Paris"`    |
//!
//! Trailing slashes are normalized on both patterns and incoming paths, and
//! captured segments are percent-decoded. Routes are matched in registration
//! order. A path that matches some route under a different method yields
//! `405 Method Not Allowed`; a path that matches nothing yields `404`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::context::{Context, PathParams};
use crate::{Method, Request, Response, StatusCode};

/// Type-erased, heap-allocated async handler that processes a [`Context`] and returns a
/// [`Response`].
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Conversion trait for async handler functions.
///
/// Any `Fn(Context) -> impl Future<Output = Response> + Send` that is also
/// `Send + Sync + 'static` implements this trait automatically.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

#[derive(Debug, Clone)]
enum Pattern {
    // One exact path string, e.g. `/weather`.
    Exact(String),
    // A fixed number of segments where some are named captures, e.g. `/weather/:city`.
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    if path != "/" && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

impl Pattern {
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if pattern.contains(':') {
            let segments = pattern
                .split('/')
                .filter(|s| !s.is_empty())
                .map(|s| match s.strip_prefix(':') {
                    Some(name) => Segment::Parameter(name.to_owned()),
                    None => Segment::Static(s.to_owned()),
                })
                .collect();
            return Pattern::Parameterized { segments };
        }

        Pattern::Exact(pattern.to_owned())
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if segments.len() != path_segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (seg, path_seg) in segments.iter().zip(path_segments) {
                    match seg {
                        Segment::Static(s) if s != path_seg => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => {
                            let value = percent_decode_str(path_seg).decode_utf8_lossy();
                            if value.is_empty() {
                                return None;
                            }
                            params.insert(name.clone(), value.into_owned());
                        }
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

/// HTTP request router that dispatches requests to registered handler functions.
///
/// # Examples
///
/// ```rust,no_run
/// use skycache::{Router, Response, StatusCode, context::Context};
///
/// let mut router = Router::new();
/// router.get("/health", |_ctx: Context| async { Response::new(StatusCode::Ok).body("ok") });
/// router.get("/weather/:city", |ctx: Context| async move {
///     let city = ctx.params().get("city").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(city)
/// });
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Register a handler for `method` requests matching `path`.
    pub fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Dispatch `request` to the first matching route and return its response.
    pub async fn route(&self, request: Request) -> Response {
        let mut path_known = false;

        for route in &self.routes {
            let Some(params) = route.pattern.matches(request.path()) else {
                continue;
            };
            if &route.method == request.method() {
                let ctx = Context::with_params(request, params);
                return (route.handler)(ctx).await;
            }
            path_known = true;
        }

        if path_known {
            Response::new(StatusCode::MethodNotAllowed)
        } else {
            Response::new(StatusCode::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn pattern_parse_trailing_slash_stripped() {
        assert!(matches!(Pattern::parse("/weather/"), Pattern::Exact(s) if s == "/weather"));
        assert!(matches!(Pattern::parse("/"), Pattern::Exact(s) if s == "/"));
    }

    #[test]
    fn pattern_parse_parameterized() {
        match Pattern::parse("/weather/:city") {
            Pattern::Parameterized { segments } => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(&segments[0], Segment::Static(s) if s == "weather"));
                assert!(matches!(&segments[1], Segment::Parameter(s) if s == "city"));
            }
            other => panic!("expected Parameterized, got {other:?}"),
        }
    }

    #[test]
    fn exact_match() {
        let pat = Pattern::parse("/weather");
        assert!(pat.matches("/weather").is_some());
        assert!(pat.matches("/weather/").is_some());
        assert!(pat.matches("/weathers").is_none());
    }

    #[test]
    fn param_is_decoded() {
        let pat = Pattern::parse("/weather/:city");
        let params = pat.matches("/weather/New%20York").unwrap();
        assert_eq!(params.get("city"), Some("New York"));
    }

    #[test]
    fn param_wrong_segment_count() {
        let pat = Pattern::parse("/weather/:city");
        assert!(pat.matches("/weather").is_none());
        assert!(pat.matches("/weather/a/b").is_none());
        assert!(pat.matches("/forecast/a").is_none());
    }

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new();
        assert!(router.is_empty());
        let res = router.route(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn get_route_dispatches_with_params() {
        let mut router = Router::new();
        router.get("/weather/:city", |ctx: Context| async move {
            let city = ctx.params().get("city").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(city)
        });
        assert_eq!(router.len(), 1);

        let res = router.route(make_request("GET", "/weather/Paris")).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_bytes(), b"Paris");
    }

    #[tokio::test]
    async fn wrong_method_is_405() {
        let mut router = Router::new();
        router.get("/weather", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        let res = router.route(make_request("POST", "/weather")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn first_matching_route_wins() {
        let mut router = Router::new();
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::Ok) });
        router.get("/path", |_ctx: Context| async { Response::new(StatusCode::NoContent) });
        let res = router.route(make_request("GET", "/path")).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }
}
