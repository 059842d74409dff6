//! Core data models for the edge image cache

use crate::error::EdgeError;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use std::fmt;

/// Query parameter carrying the cache epoch inside the cache key
pub const EPOCH_PARAM: &str = "cv";

/// Identifier under which a response is stored in the cache
///
/// Built from the normalized request path, the verbatim query string, and
/// the cache epoch. The epoch is fixed when the key is built, so a single
/// request never observes two epochs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    path: String,
    query: Option<String>,
    epoch: String,
    rendered: String,
}

impl CacheKey {
    /// Create a new cache key
    ///
    /// An empty query is treated the same as no query.
    pub fn new(path: impl Into<String>, query: Option<&str>, epoch: impl Into<String>) -> Self {
        let path = path.into();
        let query = query.filter(|q| !q.is_empty()).map(str::to_string);
        let epoch = epoch.into();

        let rendered = match &query {
            Some(q) => format!("{}?{}&{}={}", path, q, EPOCH_PARAM, epoch),
            None => format!("{}?{}={}", path, EPOCH_PARAM, epoch),
        };

        CacheKey {
            path,
            query,
            epoch,
            rendered,
        }
    }

    /// The normalized request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The query string as received, without the leading '?'
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The cache epoch this key was built with
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Path and query as forwarded to origin (the epoch is never sent upstream)
    pub fn origin_path_and_query(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// The full key string used by cache stores
    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// A response received from origin
///
/// Any HTTP status is a valid result; only transport failures are errors.
#[derive(Debug, Clone)]
pub struct UpstreamResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResult {
    /// Create a new upstream result
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        UpstreamResult {
            status,
            headers,
            body,
        }
    }

    /// Whether origin answered with a 2xx status
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// The origin failure this result represents, if it is not a 2xx
    pub fn failure(&self) -> Option<EdgeError> {
        (!self.is_ok()).then(|| EdgeError::OriginError {
            status: self.status.as_u16(),
        })
    }

    /// Content-Type reported by origin, or the empty string
    pub fn content_type(&self) -> &str {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

/// The outward-facing response
///
/// Cloned once when a copy is persisted to the cache store; the clone shares
/// the body buffer, so both copies are byte-identical.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EdgeResponse {
    /// Create a response with the given status, headers and body
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        EdgeResponse {
            status,
            headers,
            body,
        }
    }

    /// Create a response with no headers and an empty body
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), Bytes::new())
    }

    /// Create a plain-text response
    pub fn text(status: StatusCode, body: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(status, headers, Bytes::from_static(body.as_bytes()))
    }

    /// Get a header value as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Drop the body, keeping status and headers (HEAD responses)
    pub fn without_body(mut self) -> Self {
        self.body = Bytes::new();
        self
    }
}

impl From<UpstreamResult> for EdgeResponse {
    fn from(upstream: UpstreamResult) -> Self {
        EdgeResponse::new(upstream.status, upstream.headers, upstream.body)
    }
}
