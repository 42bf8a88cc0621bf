//! The service's route table.

use std::sync::Arc;

use http::{Method, StatusCode};
use serde::Serialize;

use crate::config::Config;
use crate::handler::bind;
use crate::handlers::DataHandlers;
use crate::health;
use crate::middleware::{AccessLog, Cors, RateLimiter};
use crate::response::Response;
use crate::router::Router;
use crate::store::RecordStore;

pub const DATA_PATH: &str = "/api/v1/data";

#[derive(Debug, Clone, Serialize)]
struct Welcome {
    message: &'static str,
    env: String,
    version: &'static str,
}

/// Builds the router for `config`, serving records from `store`.
///
/// CORS wraps every route. The access log is only installed in
/// development. Rate limiting covers everything under [`DATA_PATH`].
pub fn build(config: &Config, store: Arc<dyn RecordStore>) -> Router {
    let data = Arc::new(DataHandlers::new(Arc::clone(&store)));
    let welcome = Arc::new(Welcome {
        message: "Welcome to Rest API Starter!",
        env: config.env.clone(),
        version: env!("CARGO_PKG_VERSION"),
    });
    let item = format!("{DATA_PATH}/{{id}}");

    let mut router = Router::new()
        .on(Method::GET, "/", bind(welcome, |welcome, _req| async move {
            Response::builder().status(StatusCode::OK).json(&*welcome)
        }))
        .on(Method::GET, "/healthz", health::liveness)
        .on(Method::GET, "/readyz", bind(store, health::readiness))
        .on(Method::POST, DATA_PATH, bind(Arc::clone(&data), DataHandlers::create))
        .on(Method::GET, DATA_PATH, bind(Arc::clone(&data), DataHandlers::list))
        .on(Method::GET, &item, bind(Arc::clone(&data), DataHandlers::get))
        .on(Method::PATCH, &item, bind(Arc::clone(&data), DataHandlers::update))
        .on(Method::DELETE, &item, bind(data, DataHandlers::delete))
        .layer(Cors);

    if config.is_development() {
        router = router.layer(AccessLog);
    }
    router.layer_at(DATA_PATH, RateLimiter::new(config.rate_limit))
}
