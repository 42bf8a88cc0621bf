//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use thiserror::Error;

/// Largest request body the server will buffer, in bytes.
pub const MAX_BODY_BYTES: usize = 100 * 1024;

#[derive(Debug, Error)]
pub(crate) enum BodyError {
    #[error("request body exceeds {MAX_BODY_BYTES} bytes")]
    TooLarge,

    #[error("failed to read request body: {0}")]
    Read(Box<dyn std::error::Error + Send + Sync>),
}

/// An incoming HTTP request with its body fully read.
///
/// Bodies are small JSON documents, so the server buffers them, up to
/// [`MAX_BODY_BYTES`], before the request enters the middleware chain. Path parameters are filled in by the
/// router once a route matches.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    params: HashMap<String, String>,
    remote_addr: SocketAddr,
}

impl Request {
    /// Builds a request from its parts. The server uses this for every
    /// connection; tests and embedders can use it to drive a
    /// [`Router`](crate::Router) without a socket.
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: impl Into<Bytes>,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body: body.into(),
            params: HashMap::new(),
            remote_addr,
        }
    }

    /// Buffers the body of `req`, refusing bodies over [`MAX_BODY_BYTES`].
    pub(crate) async fn from_hyper<B>(req: http::Request<B>, remote_addr: SocketAddr) -> Result<Self, BodyError>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let body = Limited::new(body, MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() { BodyError::TooLarge } else { BodyError::Read(e) }
            })?
            .to_bytes();
        Ok(Self::new(parts.method, parts.uri, parts.headers, body, remote_addr))
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// Header lookup. Names are case-insensitive; non-UTF-8 values are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter, percent-decoded.
    ///
    /// For a route `/api/v1/data/{id}`, `req.param("id")` on
    /// `/api/v1/data/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the first value of a query-string parameter, form-decoded.
    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.uri.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}
