use std::sync::Arc;

use bytes::Bytes;
use data_api::middleware::TOO_MANY_REQUESTS;
use data_api::{Config, MemoryStore, Request, routes, serve};
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::Duration;

fn config(max: &str, window_ms: &str) -> Config {
    let (max, window_ms) = (max.to_owned(), window_ms.to_owned());
    Config::from_lookup(move |key| match key {
        "DATABASE" => Some("mongodb".into()),
        "MONGO_URI" => Some("mongodb://localhost:27017".into()),
        "APP_ENV" => Some("test".into()),
        "RATE_LIMIT_MAX" => Some(max.clone()),
        "RATE_LIMIT_WINDOW_MS" => Some(window_ms.clone()),
        _ => None,
    })
    .unwrap()
}

fn request(method: Method, path: &str, client: [u8; 4]) -> Request {
    Request::new(
        method,
        path.parse().unwrap(),
        HeaderMap::new(),
        Bytes::new(),
        (client, 5000).into(),
    )
}

#[tokio::test]
async fn eleventh_request_in_window_is_rejected_over_http() {
    let app = routes::build(&config("10", "60000"), Arc::new(MemoryStore::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_tx, rx) = oneshot::channel::<()>();
    tokio::spawn(serve(listener, app, async move {
        rx.await.ok();
    }));

    let client = reqwest::Client::new();
    let url = format!("http://{addr}/api/v1/data");

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["ratelimit-limit"], "10");
    assert_eq!(first.headers()["ratelimit-remaining"], "9");

    for _ in 1..10 {
        assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);
    }

    let limited = client.get(&url).send().await.unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.headers()["ratelimit-remaining"], "0");
    assert!(limited.headers().contains_key("retry-after"));
    let body: Value = limited.json().await.unwrap();
    assert_eq!(body["message"], TOO_MANY_REQUESTS);

    // Paths outside the data resource are not limited.
    let index = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(index.status(), StatusCode::OK);
    assert!(!index.headers().contains_key("ratelimit-limit"));
}

#[tokio::test(start_paused = true)]
async fn window_reopens_after_it_elapses() {
    let app = routes::build(&config("2", "1000"), Arc::new(MemoryStore::new()));
    let client = [10, 0, 0, 1];

    for _ in 0..2 {
        let res = app.handle(request(Method::GET, "/api/v1/data", client)).await;
        assert_eq!(res.status_code(), StatusCode::OK);
    }
    let res = app.handle(request(Method::GET, "/api/v1/data", client)).await;
    assert_eq!(res.status_code(), StatusCode::TOO_MANY_REQUESTS);

    tokio::time::advance(Duration::from_millis(1000)).await;

    let res = app.handle(request(Method::GET, "/api/v1/data", client)).await;
    assert_eq!(res.status_code(), StatusCode::OK);
}

#[tokio::test(start_paused = true)]
async fn unmatched_paths_under_the_prefix_still_count() {
    let app = routes::build(&config("1", "60000"), Arc::new(MemoryStore::new()));
    let client = [10, 0, 0, 2];

    let res = app.handle(request(Method::GET, "/api/v1/data/a/b", client)).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

    let res = app.handle(request(Method::GET, "/api/v1/data", client)).await;
    assert_eq!(res.status_code(), StatusCode::TOO_MANY_REQUESTS);

    let other = app.handle(request(Method::GET, "/api/v1/data", [10, 0, 0, 3])).await;
    assert_eq!(other.status_code(), StatusCode::OK);
}
