//! Fixed-window rate limiting keyed by client IP.
//!
//! Each client gets its own window, opened by its first request. Every
//! request inside the window counts; once the count passes
//! [`RateLimitConfig::max_requests`] the client is turned away with `429`
//! until the window runs out, after which the next request opens a fresh one.
//!
//! Counters live in process memory. Several instances behind a load balancer
//! each enforce the limit on their own share of the traffic, so the
//! effective limit scales with the instance count.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// Body message of every `429` response.
pub const TOO_MANY_REQUESTS: &str =
    "Wooh! Too many requests! 🐌 Slow down and try again in a minute 🙂";

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Expired windows are swept once every this many requests.
const PRUNE_EVERY: usize = 1024;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests allowed per client in one window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_millis(60_000),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self { max_requests, window }
    }
}

/// The outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed {
        /// Requests left in the current window after this one.
        remaining: u32,
        /// Time until the window closes.
        reset_after: Duration,
    },
    Denied {
        reset_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    fn remaining(&self) -> u32 {
        match self {
            Decision::Allowed { remaining, .. } => *remaining,
            Decision::Denied { .. } => 0,
        }
    }

    fn reset_after(&self) -> Duration {
        match self {
            Decision::Allowed { reset_after, .. } | Decision::Denied { reset_after } => *reset_after,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    hits: u32,
}

/// Fixed-window request counter. Cheap to clone; clones share counters.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<DashMap<IpAddr, Window>>,
    since_prune: Arc<AtomicUsize>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(DashMap::new()),
            since_prune: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Counts one request from `client` and decides whether it may proceed.
    pub fn hit(&self, client: IpAddr) -> Decision {
        let now = Instant::now();
        let decision = {
            let mut window = self
                .windows
                .entry(client)
                .or_insert(Window { opened: now, hits: 0 });

            if now.duration_since(window.opened) >= self.config.window {
                *window = Window { opened: now, hits: 0 };
            }
            window.hits = window.hits.saturating_add(1);

            let reset_after = self
                .config
                .window
                .saturating_sub(now.duration_since(window.opened));
            if window.hits > self.config.max_requests {
                Decision::Denied { reset_after }
            } else {
                Decision::Allowed {
                    remaining: self.config.max_requests - window.hits,
                    reset_after,
                }
            }
        };

        if self.since_prune.fetch_add(1, Ordering::Relaxed) + 1 >= PRUNE_EVERY {
            self.since_prune.store(0, Ordering::Relaxed);
            self.prune(now);
        }
        decision
    }

    /// Number of clients with an open window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    fn prune(&self, now: Instant) {
        let window = self.config.window;
        self.windows
            .retain(|_, w| now.duration_since(w.opened) < window);
    }

    fn write_headers(&self, headers: &mut HeaderMap, decision: &Decision) {
        let reset_secs = decision.reset_after().as_secs_f64().ceil() as u64;
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(self.config.max_requests));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining()));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs));
        if !decision.is_allowed() {
            headers.insert(RETRY_AFTER, HeaderValue::from(reset_secs));
        }
    }
}

#[derive(Serialize)]
struct Rejection {
    message: &'static str,
}

#[async_trait]
impl Middleware for RateLimiter {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let client = req.remote_addr().ip();
        let decision = self.hit(client);

        let mut res = if decision.is_allowed() {
            next.run(req).await
        } else {
            warn!(%client, path = req.path(), "rate limit exceeded");
            Response::builder()
                .status(StatusCode::TOO_MANY_REQUESTS)
                .json(&Rejection { message: TOO_MANY_REQUESTS })
        };
        self.write_headers(res.headers_mut(), &decision);
        res
    }
}
