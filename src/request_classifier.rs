//! Request classification: method gating, path gating and cache key construction

use crate::config::EdgeConfig;
use crate::models::CacheKey;
use http::Method;
use std::sync::Arc;
use tracing::debug;

/// Outcome of classifying an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// CORS preflight, answered locally with 204
    Preflight,
    /// Method other than GET/HEAD/OPTIONS, answered with 405
    Rejected,
    /// Path outside the proxy prefix while maintenance mode is on (503)
    Maintenance,
    /// Path outside the proxy prefix while maintenance mode is off (404)
    NotFound,
    /// Proxied request, looked up under this key
    Proceed(CacheKey),
}

/// Classifies inbound requests against the configured proxy policy
pub struct RequestClassifier {
    config: Arc<EdgeConfig>,
}

impl RequestClassifier {
    /// Create a new RequestClassifier with the given configuration
    pub fn new(config: Arc<EdgeConfig>) -> Self {
        RequestClassifier { config }
    }

    /// Classify a request
    ///
    /// # Logic
    /// 1. OPTIONS is a preflight
    /// 2. Anything other than GET/HEAD is rejected
    /// 3. A normalized path outside the proxy prefix is gated
    /// 4. Everything else proceeds with a cache key for the current epoch
    pub fn classify(&self, method: &Method, path: &str, query: Option<&str>) -> Classification {
        if method == Method::OPTIONS {
            debug!("Preflight request for path={}", path);
            return Classification::Preflight;
        }

        if method != Method::GET && method != Method::HEAD {
            debug!("Rejecting method={} for path={}", method, path);
            return Classification::Rejected;
        }

        let normalized = normalize_path(path);
        if !normalized.starts_with(&self.config.proxy_prefix) {
            debug!(
                "Path outside proxy prefix: path={}, prefix={}, maintenance={}",
                normalized, self.config.proxy_prefix, self.config.maintenance.enabled
            );
            return if self.config.maintenance.enabled {
                Classification::Maintenance
            } else {
                Classification::NotFound
            };
        }

        let key = CacheKey::new(normalized, query, self.config.cache_epoch.as_str());
        debug!("Proceeding with cache key={}", key);
        Classification::Proceed(key)
    }
}

/// Resolve dot segments the way a URL parser does
///
/// `%2e` counts as a dot in either case and `\` as a separator, matching
/// what the origin client will do to the path when it parses the URL.
/// Other percent-encoding is left untouched. The result always starts with '/'.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let raw = unified.strip_prefix('/').unwrap_or(&unified);
    let parts: Vec<&str> = raw.split('/').collect();
    let last = parts.len().saturating_sub(1);

    let mut segments: Vec<&str> = Vec::with_capacity(parts.len());
    for (i, segment) in parts.iter().enumerate() {
        match dot_segment(segment) {
            Some(DotSegment::Current) => {
                if i == last {
                    segments.push("");
                }
            }
            Some(DotSegment::Parent) => {
                segments.pop();
                if i == last {
                    segments.push("");
                }
            }
            None => segments.push(*segment),
        }
    }

    format!("/{}", segments.join("/"))
}

enum DotSegment {
    Current,
    Parent,
}

fn dot_segment(segment: &str) -> Option<DotSegment> {
    if segment.len() > 6 {
        return None;
    }
    match segment.to_ascii_lowercase().replace("%2e", ".").as_str() {
        "." => Some(DotSegment::Current),
        ".." => Some(DotSegment::Parent),
        _ => None,
    }
}
