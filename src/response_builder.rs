//! Response builder: header sanitization, cache directives and CORS
//!
//! Every outward response passes through [`ResponseBuilder::apply_cors`],
//! cache hits included, since stored entries are not trusted to carry
//! per-request CORS headers.

use crate::cache_policy::CachePolicy;
use crate::config::EdgeConfig;
use crate::maintenance::MaintenancePage;
use crate::models::{EdgeResponse, UpstreamResult};
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use tracing::{debug, warn};

/// Origin headers that expose origin infrastructure
pub const INTERNAL_HEADERS: [&str; 3] = ["x-kong-upstream-latency", "x-kong-proxy-latency", "via"];

/// Hop-by-hop headers that never survive a proxy hop
const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

pub const CDN_CACHE_CONTROL: &str = "cdn-cache-control";
pub const X_SERVED_BY: &str = "x-served-by";

const ALLOWED_METHODS: &str = "GET, HEAD, OPTIONS";
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Result of building a response from an origin result
#[derive(Debug, Clone)]
pub struct BuiltResponse {
    /// Response handed back to the caller (CORS not yet applied)
    pub response: EdgeResponse,
    /// Copy to persist, present only for successful origin results
    pub cache_copy: Option<EdgeResponse>,
}

/// Builds outward responses
pub struct ResponseBuilder {
    policy: CachePolicy,
    served_by: HeaderValue,
    strip: Vec<HeaderName>,
    maintenance: MaintenancePage,
}

impl ResponseBuilder {
    /// Create a new ResponseBuilder
    pub fn new(config: &EdgeConfig, maintenance: MaintenancePage) -> Self {
        let served_by = HeaderValue::from_str(&config.served_by)
            .unwrap_or_else(|_| HeaderValue::from_static("edge-image-cache"));

        let mut strip: Vec<HeaderName> = INTERNAL_HEADERS
            .iter()
            .chain(HOP_BY_HOP_HEADERS.iter())
            .map(|name| HeaderName::from_static(*name))
            .collect();
        for extra in &config.strip_headers {
            match HeaderName::from_bytes(extra.to_ascii_lowercase().as_bytes()) {
                Ok(name) => strip.push(name),
                Err(e) => warn!("Ignoring invalid strip_headers entry '{}': {}", extra, e),
            }
        }

        ResponseBuilder {
            policy: CachePolicy::from_config(config),
            served_by,
            strip,
            maintenance,
        }
    }

    /// Build the outward response for an origin result
    ///
    /// Strips internal headers, stamps cache directives and the server
    /// marker, and hands back a copy for the cache store when origin
    /// succeeded. The copy shares its body buffer with the response.
    pub fn build(&self, upstream: UpstreamResult) -> BuiltResponse {
        let failure = upstream.failure();
        let decision = self
            .policy
            .decide(failure.is_none(), upstream.content_type());

        let UpstreamResult {
            status,
            mut headers,
            body,
        } = upstream;
        self.sanitize(&mut headers);

        match &failure {
            None => {
                headers.insert(
                    header::CACHE_CONTROL,
                    directive(format!("public, max-age={}, immutable", decision.ttl_secs)),
                );
                headers.insert(
                    HeaderName::from_static(CDN_CACHE_CONTROL),
                    directive(format!("public, max-age={}", decision.ttl_secs)),
                );
            }
            Some(err) => {
                // Passed through with its own status, short-lived and never stored
                debug!("Passing origin failure through: {}", err);
                headers.insert(
                    header::CACHE_CONTROL,
                    directive(format!("public, max-age={}", self.policy.short_ttl_secs())),
                );
                headers.remove(CDN_CACHE_CONTROL);
            }
        }
        headers.insert(HeaderName::from_static(X_SERVED_BY), self.served_by.clone());

        debug!(
            "Built response: status={}, ttl={}, long_lived={}",
            status, decision.ttl_secs, decision.long_lived
        );

        let response = EdgeResponse::new(status, headers, body);
        let cache_copy = failure.is_none().then(|| response.clone());
        BuiltResponse {
            response,
            cache_copy,
        }
    }

    /// Remove internal and hop-by-hop headers
    pub fn sanitize(&self, headers: &mut HeaderMap) {
        for name in &self.strip {
            headers.remove(name);
        }
    }

    /// Overwrite CORS headers with the wildcard policy
    ///
    /// The origin is never echoed, so one stored response serves every
    /// calling origin and no `Vary: Origin` split occurs.
    pub fn apply_cors(&self, mut response: EdgeResponse) -> EdgeResponse {
        response.headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response.headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        response
    }

    /// 204 answer to a CORS preflight
    pub fn preflight(&self) -> EdgeResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        EdgeResponse::new(StatusCode::NO_CONTENT, headers, Bytes::new())
    }

    /// 405 for unsupported methods
    pub fn method_not_allowed(&self) -> EdgeResponse {
        let mut response = EdgeResponse::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        response
            .headers
            .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        response
    }

    /// 503 maintenance page for out-of-scope paths
    pub fn maintenance(&self) -> EdgeResponse {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from(self.maintenance.retry_after_secs()),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        EdgeResponse::new(StatusCode::SERVICE_UNAVAILABLE, headers, self.maintenance.body())
    }

    /// 404 for out-of-scope paths when maintenance mode is off
    pub fn not_found(&self) -> EdgeResponse {
        let mut response = EdgeResponse::text(StatusCode::NOT_FOUND, "Not Found");
        response
            .headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }

    /// 502 for an unreachable origin
    pub fn bad_gateway(&self) -> EdgeResponse {
        let mut response = EdgeResponse::text(StatusCode::BAD_GATEWAY, "Failed to reach storage");
        response
            .headers
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
            .headers
            .insert(HeaderName::from_static(X_SERVED_BY), self.served_by.clone());
        response
    }
}

fn directive(value: String) -> HeaderValue {
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("no-store"))
}
