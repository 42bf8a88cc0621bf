use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

/// HTTP access log.
///
/// Emits one event per request under the `http` target:
///
/// ```text
/// 127.0.0.1 GET /api/v1/data?type=x 200 312 - 1.204 ms
/// ```
///
/// The router only installs it when the service runs in `development`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLog;

#[async_trait]
impl Middleware for AccessLog {
    async fn handle(&self, req: Request, next: Next) -> Response {
        let started = Instant::now();
        let remote = req.remote_addr().ip();
        let method = req.method().clone();
        let uri = req.uri().clone();

        let res = next.run(req).await;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            target: "http",
            "{remote} {method} {uri} {} {} - {elapsed_ms:.3} ms",
            res.status_code().as_u16(),
            res.body().len(),
        );
        res
    }
}
