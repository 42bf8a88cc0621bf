use async_trait::async_trait;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_REQUEST_HEADERS, HeaderValue, VARY,
};
use http::{Method, StatusCode};

use super::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

const ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// Permissive CORS: any origin, the standard method set.
///
/// `OPTIONS` requests are answered here with `204 No Content` and never reach
/// a route. Requested headers are echoed back in `Access-Control-Allow-Headers`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cors;

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, req: Request, next: Next) -> Response {
        if *req.method() == Method::OPTIONS {
            let mut res = Response::builder()
                .status(StatusCode::NO_CONTENT)
                .header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"))
                .header(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS))
                .no_body();
            if let Some(requested) = req.headers().get(ACCESS_CONTROL_REQUEST_HEADERS) {
                res.headers_mut().insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
                res.headers_mut()
                    .append(VARY, HeaderValue::from_static("Access-Control-Request-Headers"));
            }
            return res;
        }

        let mut res = next.run(req).await;
        res.headers_mut()
            .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        res
    }
}
