//! Per-request context handed to route handlers.

use std::collections::HashMap;

use crate::Request;

/// Path parameters captured by the matched route (`/weather/:city`).
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// A request together with what routing learned about it.
#[derive(Debug)]
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Gives the request back, discarding captured parameters.
    pub fn into_request(self) -> Request {
        self.request
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Returns every decoded value of the query parameter `key`, in order,
    /// empty values included.
    pub fn query_values(&self, key: &str) -> Vec<String> {
        self.request
            .query_params(key)
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_keep_order_and_empties() {
        let raw = b"GET /weather?city=Paris&city=&city=Oslo HTTP/1.1\r\n\r\n";
        let (request, _) = Request::parse(raw).unwrap();
        let ctx = Context::new(request);

        assert_eq!(ctx.query_values("city"), ["Paris", "", "Oslo"]);
        assert!(ctx.query_values("town").is_empty());
    }

    #[test]
    fn path_params_are_looked_up_by_name() {
        let raw = b"GET /weather/Paris HTTP/1.1\r\n\r\n";
        let (request, _) = Request::parse(raw).unwrap();
        let mut params = PathParams::new();
        params.insert("city".to_owned(), "Paris".to_owned());

        let ctx = Context::with_params(request, params);
        assert_eq!(ctx.params().get("city"), Some("Paris"));
        assert_eq!(ctx.params().get("country"), None);
        assert_eq!(ctx.into_request().path(), "/weather/Paris");
    }
}
