//! # data-api
//!
//! A small REST service exposing CRUD over a single schemaless resource,
//! *Data*: a `type` tag, an arbitrary JSON `data` payload and optional
//! `metadata`. Records live in MongoDB or Firestore; the `DATABASE`
//! environment variable picks one at startup.
//!
//! ## Routes
//!
//! | Method | Path | |
//! |---|---|---|
//! | `GET` | `/` | welcome message |
//! | `GET` | `/healthz`, `/readyz` | probes |
//! | `POST` | `/api/v1/data` | create |
//! | `GET` | `/api/v1/data?type=` | list, optionally by type |
//! | `GET` | `/api/v1/data/{id}` | fetch |
//! | `PATCH` | `/api/v1/data/{id}` | partial update |
//! | `DELETE` | `/api/v1/data/{id}` | delete |
//!
//! Everything under `/api/v1/data` is rate limited per client IP.
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use data_api::{Config, MemoryStore, Server, routes};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), data_api::Error> {
//!     let config = Config::from_env()?;
//!     let app = routes::build(&config, Arc::new(MemoryStore::new()));
//!     Server::bind(&config.listen_addr())?.serve(app).await
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod record;
pub mod routes;
pub mod store;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use error::Error;
pub use handler::{Handler, bind};
pub use record::{NewRecord, Record, RecordPatch};
pub use request::{MAX_BODY_BYTES, Request};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::{Server, serve};
pub use store::{Backend, FirestoreStore, MemoryStore, MongoStore, RecordStore, StoreError};
