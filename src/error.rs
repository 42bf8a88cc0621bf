//! Unified error type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// The error type returned by the service's fallible startup and serving
/// operations.
///
/// Request-level failures (404, 429, a store error on one request) are
/// expressed as HTTP [`Response`](crate::Response) values, not as `Error`s.
/// This type surfaces infrastructure failures: bad configuration, an
/// unreachable backend, binding to a port, installing the log subscriber.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("telemetry: {0}")]
    Telemetry(String),
}
