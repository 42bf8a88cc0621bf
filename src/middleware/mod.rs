//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Each layer receives the request and a [`Next`]
//! handle; calling [`Next::run`] passes control inward (to the next layer,
//! then the matched handler). Returning without calling it short-circuits
//! the chain, which is how the rate limiter and CORS preflight answer.
//!
//! Layers are registered on the [`Router`](crate::Router) either globally
//! ([`Router::layer`](crate::Router::layer)) or for a path prefix
//! ([`Router::layer_at`](crate::Router::layer_at)). Registration order is
//! outermost first.
//!
//! Built-in middleware:
//! - [`Cors`]: permissive cross-origin headers and preflight answers
//! - [`AccessLog`]: one `http` event per request (development only)
//! - [`RateLimiter`]: fixed-window per-client request guard

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::BoxedHandler;
use crate::request::Request;
use crate::response::Response;

mod access_log;
mod cors;
mod rate_limit;

pub use access_log::AccessLog;
pub use cors::Cors;
pub use rate_limit::{Decision, RateLimitConfig, RateLimiter, TOO_MANY_REQUESTS};

/// A request interceptor.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: Request, next: Next) -> Response;
}

/// The remainder of the chain: inner layers, then the endpoint.
pub struct Next {
    layers: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: BoxedHandler,
}

impl Next {
    pub(crate) fn new(layers: Vec<Arc<dyn Middleware>>, endpoint: BoxedHandler) -> Self {
        Self { layers: layers.into(), index: 0, endpoint }
    }

    /// Runs the rest of the chain and returns its response.
    pub async fn run(self, req: Request) -> Response {
        match self.layers.get(self.index) {
            Some(layer) => {
                let layer = Arc::clone(layer);
                let next = Next {
                    layers: Arc::clone(&self.layers),
                    index: self.index + 1,
                    endpoint: self.endpoint,
                };
                layer.handle(req, next).await
            }
            None => self.endpoint.call(req).await,
        }
    }
}
