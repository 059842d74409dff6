//! Metrics collection for the edge cache
//!
//! Thread-safe counters using atomic operations. Tracks request outcomes,
//! cache hits/misses, origin fetches, bytes and latencies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector
///
/// All operations are thread-safe using atomic operations.
#[derive(Debug, Default)]
pub struct EdgeMetrics {
    // Request statistics
    total_requests: AtomicU64,
    preflight_requests: AtomicU64,
    rejected_requests: AtomicU64,
    maintenance_responses: AtomicU64,

    // Cache statistics
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_errors: AtomicU64,
    cache_writes: AtomicU64,
    cache_write_failures: AtomicU64,

    // Origin statistics
    origin_fetches: AtomicU64,
    origin_error_responses: AtomicU64,
    origin_unreachable: AtomicU64,

    // Byte statistics
    bytes_from_origin: AtomicU64,
    bytes_from_cache: AtomicU64,
    bytes_to_client: AtomicU64,

    // Latency statistics (stored as microseconds)
    total_request_duration_us: AtomicU64,
    total_origin_duration_us: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub preflight_requests: u64,
    pub rejected_requests: u64,
    pub maintenance_responses: u64,

    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_errors: u64,
    pub cache_writes: u64,
    pub cache_write_failures: u64,

    pub origin_fetches: u64,
    pub origin_error_responses: u64,
    pub origin_unreachable: u64,

    pub bytes_from_origin: u64,
    pub bytes_from_cache: u64,
    pub bytes_to_client: u64,

    pub total_request_duration_us: u64,
    pub total_origin_duration_us: u64,
}

impl EdgeMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_preflight(&self) {
        self.preflight_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a 405
    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an out-of-scope path (maintenance page or 404)
    pub fn record_maintenance(&self) {
        self.maintenance_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed cache lookup (served as a miss)
    pub fn record_cache_error(&self) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished cache write
    ///
    /// # Arguments
    /// * `success` - Whether the store accepted the write
    pub fn record_cache_write(&self, success: bool) {
        self.cache_writes.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.cache_write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an origin fetch that produced a response
    ///
    /// # Arguments
    /// * `ok` - Whether origin answered with a 2xx status
    /// * `duration` - Time spent waiting for origin
    pub fn record_origin_fetch(&self, ok: bool, duration: Duration) {
        self.origin_fetches.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.origin_error_responses.fetch_add(1, Ordering::Relaxed);
        }
        self.total_origin_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record an origin fetch that failed at the transport level
    pub fn record_origin_unreachable(&self, duration: Duration) {
        self.origin_fetches.fetch_add(1, Ordering::Relaxed);
        self.origin_unreachable.fetch_add(1, Ordering::Relaxed);
        self.total_origin_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_bytes_from_origin(&self, bytes: u64) {
        self.bytes_from_origin.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_from_cache(&self, bytes: u64) {
        self.bytes_from_cache.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_request_duration(&self, duration: Duration) {
        self.total_request_duration_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    ///
    /// Fields are loaded independently, so a snapshot taken under load may
    /// not be perfectly consistent across fields.
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            preflight_requests: self.preflight_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            maintenance_responses: self.maintenance_responses.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
            origin_error_responses: self.origin_error_responses.load(Ordering::Relaxed),
            origin_unreachable: self.origin_unreachable.load(Ordering::Relaxed),
            bytes_from_origin: self.bytes_from_origin.load(Ordering::Relaxed),
            bytes_from_cache: self.bytes_from_cache.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
            total_request_duration_us: self.total_request_duration_us.load(Ordering::Relaxed),
            total_origin_duration_us: self.total_origin_duration_us.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.preflight_requests,
            &self.rejected_requests,
            &self.maintenance_responses,
            &self.cache_hits,
            &self.cache_misses,
            &self.cache_errors,
            &self.cache_writes,
            &self.cache_write_failures,
            &self.origin_fetches,
            &self.origin_error_responses,
            &self.origin_unreachable,
            &self.bytes_from_origin,
            &self.bytes_from_cache,
            &self.bytes_to_client,
            &self.total_request_duration_us,
            &self.total_origin_duration_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl MetricsSnapshot {
    /// Cache hit rate as a percentage (0.0 to 100.0)
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / total as f64) * 100.0
        }
    }

    /// Average request duration in milliseconds
    pub fn avg_request_duration_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.total_request_duration_us as f64 / self.total_requests as f64) / 1000.0
        }
    }

    /// Average origin fetch duration in milliseconds
    pub fn avg_origin_duration_ms(&self) -> f64 {
        if self.origin_fetches == 0 {
            0.0
        } else {
            (self.total_origin_duration_us as f64 / self.origin_fetches as f64) / 1000.0
        }
    }
}
