//! Kubernetes health-check handlers.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the store be reached? Failure → pulled from load-balancer. |

use std::sync::Arc;

use http::StatusCode;
use tracing::warn;

use crate::store::RecordStore;
use crate::{Request, Response};

/// Always `200 OK` with body `"ok"`. No dependencies.
pub async fn liveness(_req: Request) -> Response {
    Response::text("ok")
}

/// `200 OK` with body `"ready"` while the store answers a ping, `503`
/// otherwise. Register with [`bind`](crate::bind).
pub async fn readiness(store: Arc<dyn RecordStore>, _req: Request) -> Response {
    match store.ping().await {
        Ok(()) => Response::text("ready"),
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            Response::status(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
