//! TTL assignment for origin results

use crate::config::EdgeConfig;

/// TTL decision for one origin result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    /// max-age in seconds
    pub ttl_secs: u64,
    /// Whether the result earns the long-lived tier
    pub long_lived: bool,
}

/// Two-tier cache policy
///
/// Only a successful, image-like response gets the long TTL. Everything else,
/// including ok-but-not-image and any error status, gets the short TTL so a
/// transient origin failure is never pinned for the long period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    long_ttl_secs: u64,
    short_ttl_secs: u64,
}

impl CachePolicy {
    /// Create a policy with explicit TTLs
    pub fn new(long_ttl_secs: u64, short_ttl_secs: u64) -> Self {
        CachePolicy {
            long_ttl_secs,
            short_ttl_secs,
        }
    }

    /// Create a policy from configuration
    pub fn from_config(config: &EdgeConfig) -> Self {
        Self::new(config.long_ttl_secs, config.short_ttl_secs)
    }

    pub fn long_ttl_secs(&self) -> u64 {
        self.long_ttl_secs
    }

    pub fn short_ttl_secs(&self) -> u64 {
        self.short_ttl_secs
    }

    /// Decide the TTL for a result
    pub fn decide(&self, status_ok: bool, content_type: &str) -> PolicyDecision {
        if status_ok && is_image_like(content_type) {
            PolicyDecision {
                ttl_secs: self.long_ttl_secs,
                long_lived: true,
            }
        } else {
            PolicyDecision {
                ttl_secs: self.short_ttl_secs,
                long_lived: false,
            }
        }
    }
}

/// A payload is image-like if its content type starts with `image/` or
/// mentions `octet-stream` anywhere
pub fn is_image_like(content_type: &str) -> bool {
    content_type.starts_with("image/") || content_type.contains("octet-stream")
}
