//! Radix-tree request router with a middleware chain.
//!
//! One tree per HTTP method. O(path-length) lookup. Middleware is attached
//! either to every request or to requests under a path prefix, and runs
//! whether or not a route matched, so a rate limit on `/api/v1/data` also
//! counts requests for paths under it that do not exist.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

struct Layer {
    prefix: Option<String>,
    middleware: Arc<dyn Middleware>,
}

impl Layer {
    fn applies_to(&self, path: &str) -> bool {
        match &self.prefix {
            None => true,
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    layers: Vec<Layer>,
    fallback: BoxedHandler,
}

async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            layers: Vec::new(),
            fallback: not_found.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use data_api::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_record(_: Request) -> Response { Response::text("") }
    /// # async fn create_record(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/api/v1/data/{id}", get_record)
    ///     .on(Method::POST, "/api/v1/data",      create_record);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route pattern or collides with an
    /// already registered one. Route tables are static, so this is a
    /// programming error caught at startup.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    /// Wrap every request in `middleware`.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.layers.push(Layer { prefix: None, middleware: Arc::new(middleware) });
        self
    }

    /// Wrap requests whose path is `prefix` or lies under it in `middleware`.
    pub fn layer_at(mut self, prefix: &str, middleware: impl Middleware) -> Self {
        let prefix = prefix.trim_end_matches('/').to_owned();
        self.layers.push(Layer { prefix: Some(prefix), middleware: Arc::new(middleware) });
        self
    }

    /// Routes one request through the middleware chain to its handler.
    ///
    /// A path with one trailing slash matches the route without it.
    pub async fn handle(&self, mut req: Request) -> Response {
        let found = self.lookup(req.method(), req.path()).or_else(|| {
            let trimmed = req.path().strip_suffix('/').filter(|p| !p.is_empty())?;
            self.lookup(req.method(), trimmed)
        });
        let endpoint = match found {
            Some((handler, params)) => {
                req.set_params(params);
                handler
            }
            None => Arc::clone(&self.fallback),
        };

        let layers = self
            .layers
            .iter()
            .filter(|layer| layer.applies_to(req.path()))
            .map(|layer| Arc::clone(&layer.middleware))
            .collect();

        Next::new(layers, endpoint).run(req).await
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((handler, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bytes::Bytes;
    use http::HeaderMap;
    use http::header::{HeaderName, HeaderValue};

    use super::*;

    fn request(method: Method, uri: &str) -> Request {
        Request::new(method, uri.parse().unwrap(), HeaderMap::new(), Bytes::new(), "127.0.0.1:9000".parse().unwrap())
    }

    async fn echo_id(req: Request) -> String {
        req.param("id").unwrap_or_default().to_owned()
    }

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        async fn handle(&self, req: Request, next: Next) -> Response {
            let mut res = next.run(req).await;
            let name = HeaderName::from_static("x-tag");
            let tags = match res.headers().get(&name) {
                Some(existing) => format!("{},{}", existing.to_str().unwrap_or_default(), self.0),
                None => self.0.to_owned(),
            };
            res.headers_mut().insert(name, HeaderValue::from_str(&tags).unwrap());
            res
        }
    }

    #[tokio::test]
    async fn path_params_are_decoded() {
        let router = Router::new().on(Method::GET, "/items/{id}", echo_id);
        let res = router.handle(request(Method::GET, "/items/a%20b")).await;
        assert_eq!(res.body(), b"a b");
    }

    #[tokio::test]
    async fn one_trailing_slash_is_ignored() {
        let router = Router::new()
            .on(Method::GET, "/items", |_req: Request| async { "all" })
            .on(Method::GET, "/items/{id}", echo_id);

        assert_eq!(router.handle(request(Method::GET, "/items/")).await.body(), b"all");
        assert_eq!(router.handle(request(Method::GET, "/items/7/")).await.body(), b"7");
        assert_eq!(router.handle(request(Method::GET, "/items//")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_and_method_are_404() {
        let router = Router::new().on(Method::GET, "/items/{id}", echo_id);
        assert_eq!(router.handle(request(Method::GET, "/nope")).await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(router.handle(request(Method::PUT, "/items/1")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scoped_layers_only_wrap_their_prefix() {
        let router = Router::new()
            .on(Method::GET, "/api/items/{id}", echo_id)
            .on(Method::GET, "/apix", echo_id)
            .layer(Tag("outer"))
            .layer_at("/api/items", Tag("inner"));

        let scoped = router.handle(request(Method::GET, "/api/items/7")).await;
        assert_eq!(scoped.headers()["x-tag"], "inner,outer");

        let unmatched = router.handle(request(Method::GET, "/api/items/7/extra")).await;
        assert_eq!(unmatched.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(unmatched.headers()["x-tag"], "inner,outer");

        let other = router.handle(request(Method::GET, "/apix")).await;
        assert_eq!(other.headers()["x-tag"], "outer");
    }
}
