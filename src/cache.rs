//! Cache store contract and the in-memory regional store
//!
//! The proxy only needs `lookup` and `put`. [`MemoryCacheStore`] keeps
//! responses in process, expiring them according to the `max-age` the
//! response builder stamped on them, with optional LRU eviction by size.

use crate::error::{EdgeError, Result};
use crate::models::{CacheKey, EdgeResponse};
use async_trait::async_trait;
use http::HeaderMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Key to response store queried before origin and populated after a miss
///
/// Implementations are best-effort: callers treat a failed lookup as a miss
/// and drop failed writes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a stored response
    async fn lookup(&self, key: &CacheKey) -> Result<Option<EdgeResponse>>;

    /// Store a response under the key, replacing any previous entry
    async fn put(&self, key: &CacheKey, response: EdgeResponse) -> Result<()>;
}

/// Cached response with expiration and access tracking
#[derive(Clone)]
struct CacheEntry {
    response: EdgeResponse,
    size: usize,
    expires_at: Instant,
    last_accessed: Instant,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

/// In-process cache store
pub struct MemoryCacheStore {
    storage: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    max_size_bytes: Option<usize>,
    current_size_bytes: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCacheStore {
    /// Create an unbounded store
    ///
    /// # Arguments
    /// * `default_ttl` - Lifetime of entries whose headers carry no max-age
    pub fn new(default_ttl: Duration) -> Self {
        MemoryCacheStore {
            storage: RwLock::new(HashMap::new()),
            default_ttl,
            max_size_bytes: None,
            current_size_bytes: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a store bounded to `max_size_bytes` (LRU eviction)
    ///
    /// A bound of 0 means unbounded.
    pub fn with_max_size(default_ttl: Duration, max_size_bytes: usize) -> Self {
        let mut store = Self::new(default_ttl);
        store.max_size_bytes = (max_size_bytes > 0).then_some(max_size_bytes);
        store
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheStats {
        let total_entries = self.storage.read().map(|s| s.len()).unwrap_or(0);
        CacheStats {
            total_entries,
            total_bytes: self.current_size_bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Remove every entry
    pub fn clear(&self) {
        if let Ok(mut storage) = self.storage.write() {
            storage.clear();
            self.current_size_bytes.store(0, Ordering::Relaxed);
        }
    }

    fn entry_size(key: &str, response: &EdgeResponse) -> usize {
        let header_bytes: usize = response
            .headers
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        key.len() + header_bytes + response.body.len()
    }

    /// Lifetime for a stored response, `None` if it must not be stored
    fn lifetime(&self, headers: &HeaderMap) -> Option<Duration> {
        let directives = cache_control_directives(headers);
        if directives.iter().any(|d| d == "no-store") {
            return None;
        }
        match directives
            .iter()
            .find_map(|d| d.strip_prefix("max-age=").map(|v| v.parse::<u64>()))
        {
            Some(Ok(0)) => None,
            Some(Ok(secs)) => Some(Duration::from_secs(secs)),
            Some(Err(_)) | None => Some(self.default_ttl),
        }
    }

    /// Clean up expired entries
    fn cleanup_expired(&self, storage: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        let mut removed_bytes = 0;
        storage.retain(|_, entry| {
            if entry.expires_at <= now {
                removed_bytes += entry.size;
                false
            } else {
                true
            }
        });
        if removed_bytes > 0 {
            self.current_size_bytes.fetch_sub(removed_bytes, Ordering::Relaxed);
        }
    }

    /// Evict least recently used entries until `needed_bytes` fit
    fn evict_lru(&self, storage: &mut HashMap<String, CacheEntry>, needed_bytes: usize, max: usize) {
        let mut entries: Vec<_> = storage
            .iter()
            .map(|(k, v)| (k.clone(), v.last_accessed, v.size))
            .collect();
        entries.sort_by_key(|(_, last_accessed, _)| *last_accessed);

        let mut current = self.current_size_bytes.load(Ordering::Relaxed);
        let mut evicted = 0usize;
        for (key, _, size) in entries {
            if current + needed_bytes <= max {
                break;
            }
            storage.remove(&key);
            current = current.saturating_sub(size);
            evicted += 1;
        }
        self.current_size_bytes.store(current, Ordering::Relaxed);

        debug!(
            "LRU eviction: removed {} entries, {} bytes remain",
            evicted, current
        );
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<EdgeResponse>> {
        let now = Instant::now();
        let mut storage = self
            .storage
            .write()
            .map_err(|e| EdgeError::CacheError(format!("cache lock poisoned: {}", e)))?;

        let found = match storage.get_mut(key.as_str()) {
            Some(entry) if entry.expires_at > now => {
                entry.last_accessed = now;
                Some(entry.response.clone())
            }
            Some(_) => {
                debug!("Cache entry expired: key={}", key);
                if let Some(entry) = storage.remove(key.as_str()) {
                    self.current_size_bytes.fetch_sub(entry.size, Ordering::Relaxed);
                }
                None
            }
            None => None,
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit: key={}", key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache miss: key={}", key);
        }

        Ok(found)
    }

    async fn put(&self, key: &CacheKey, response: EdgeResponse) -> Result<()> {
        let Some(ttl) = self.lifetime(&response.headers) else {
            debug!("Response not storable, skipping: key={}", key);
            return Ok(());
        };

        let size = Self::entry_size(key.as_str(), &response);
        if let Some(max) = self.max_size_bytes {
            if size > max {
                warn!(
                    "Response larger than cache capacity, skipping: key={}, size={}, max={}",
                    key, size, max
                );
                return Ok(());
            }
        }

        let now = Instant::now();
        let mut storage = self
            .storage
            .write()
            .map_err(|e| EdgeError::CacheError(format!("cache lock poisoned: {}", e)))?;

        if let Some(old) = storage.remove(key.as_str()) {
            self.current_size_bytes.fetch_sub(old.size, Ordering::Relaxed);
        }

        if let Some(max) = self.max_size_bytes {
            if self.current_size_bytes.load(Ordering::Relaxed) + size > max {
                self.cleanup_expired(&mut storage);
            }
            if self.current_size_bytes.load(Ordering::Relaxed) + size > max {
                self.evict_lru(&mut storage, size, max);
            }
        }

        storage.insert(
            key.as_str().to_string(),
            CacheEntry {
                response,
                size,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
        self.current_size_bytes.fetch_add(size, Ordering::Relaxed);

        debug!("Stored response: key={}, size={}, ttl={:?}", key, size, ttl);
        Ok(())
    }
}

/// Lower-cased, trimmed Cache-Control directives
fn cache_control_directives(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(http::header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}
