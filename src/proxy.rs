//! EdgeProxy: the fetch-through request flow
//!
//! Classifier → (lookup hit → builder) | (lookup miss → origin → builder).
//! Each request snapshots the current configuration when it starts, so the
//! cache epoch cannot change under a request even if a reload lands
//! mid-flight.

use crate::background::BackgroundWrites;
use crate::cache::{CacheStore, MemoryCacheStore};
use crate::config::{ConfigChanges, EdgeConfig};
use crate::error::{EdgeError, Result};
use crate::maintenance::MaintenancePage;
use crate::metrics::EdgeMetrics;
use crate::models::{CacheKey, EdgeResponse};
use crate::origin_fetcher::OriginFetcher;
use crate::request_classifier::{Classification, RequestClassifier};
use crate::response_builder::ResponseBuilder;
use http::header::HeaderName;
use http::{HeaderValue, Method};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Header reporting whether a proxied response came from the cache
pub const X_CACHE_STATUS: &str = "x-cache-status";

/// How a request was answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Preflight,
    Rejected,
    Maintenance,
    NotFound,
    CacheHit,
    CacheMiss,
    OriginUnreachable,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Preflight => "preflight",
            RequestOutcome::Rejected => "rejected",
            RequestOutcome::Maintenance => "maintenance",
            RequestOutcome::NotFound => "not_found",
            RequestOutcome::CacheHit => "hit",
            RequestOutcome::CacheMiss => "miss",
            RequestOutcome::OriginUnreachable => "origin_unreachable",
        }
    }
}

impl fmt::Display for RequestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-configuration components, rebuilt as a unit on reload
struct ProxyState {
    config: Arc<EdgeConfig>,
    classifier: RequestClassifier,
    fetcher: OriginFetcher,
    builder: ResponseBuilder,
}

impl ProxyState {
    fn new(config: Arc<EdgeConfig>) -> Result<Self> {
        config.validate()?;
        let maintenance = MaintenancePage::load(&config.maintenance)?;
        Ok(ProxyState {
            classifier: RequestClassifier::new(Arc::clone(&config)),
            fetcher: OriginFetcher::new(&config)?,
            builder: ResponseBuilder::new(&config, maintenance),
            config,
        })
    }
}

/// Read-through edge cache in front of the origin store
#[derive(Clone)]
pub struct EdgeProxy {
    state: Arc<RwLock<Arc<ProxyState>>>,
    store: Arc<dyn CacheStore>,
    metrics: Arc<EdgeMetrics>,
    writes: BackgroundWrites,
}

impl EdgeProxy {
    /// Create a proxy backed by an in-memory cache store
    ///
    /// # Example
    /// ```
    /// use edge_image_cache::{EdgeConfig, EdgeProxy};
    /// use std::sync::Arc;
    ///
    /// let proxy = EdgeProxy::new(Arc::new(EdgeConfig::default())).unwrap();
    /// assert_eq!(proxy.config().cache_epoch, "v1");
    /// ```
    pub fn new(config: Arc<EdgeConfig>) -> Result<Self> {
        let store = MemoryCacheStore::with_max_size(
            Duration::from_secs(config.short_ttl_secs),
            config.cache_max_size_bytes,
        );
        Self::with_store(config, Arc::new(store))
    }

    /// Create a proxy over an arbitrary cache store
    pub fn with_store(config: Arc<EdgeConfig>, store: Arc<dyn CacheStore>) -> Result<Self> {
        let state = ProxyState::new(config)?;
        Ok(EdgeProxy {
            state: Arc::new(RwLock::new(Arc::new(state))),
            store,
            metrics: Arc::new(EdgeMetrics::new()),
            writes: BackgroundWrites::new(),
        })
    }

    fn snapshot(&self) -> Arc<ProxyState> {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// The configuration new requests will use
    pub fn config(&self) -> Arc<EdgeConfig> {
        Arc::clone(&self.snapshot().config)
    }

    pub fn metrics(&self) -> &EdgeMetrics {
        &self.metrics
    }

    pub fn metrics_arc(&self) -> Arc<EdgeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Tracker for cache writes still in flight
    pub fn background_writes(&self) -> &BackgroundWrites {
        &self.writes
    }

    /// Swap in a new configuration
    ///
    /// Requests already running keep the configuration they started with.
    /// The cache store is kept: bumping the epoch makes old entries
    /// unreachable rather than deleting them.
    pub fn reload_config(&self, new_config: EdgeConfig) -> Result<ConfigChanges> {
        let mut current = (*self.config()).clone();
        let changes = current.update_from(&new_config)?;
        let state = ProxyState::new(Arc::new(current))?;

        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(state);

        if changes.has_changes() {
            info!("Configuration reloaded: {}", changes.summary().join(", "));
        }
        Ok(changes)
    }

    /// Handle one inbound request
    ///
    /// Never fails: every failure mode has an outward status (405, 404/503,
    /// 502) or is absorbed (cache store errors).
    pub async fn handle(&self, method: &Method, path: &str, query: Option<&str>) -> EdgeResponse {
        let start = Instant::now();
        let state = self.snapshot();
        self.metrics.record_request();

        let (response, outcome) = match state.classifier.classify(method, path, query) {
            Classification::Preflight => {
                self.metrics.record_preflight();
                (state.builder.preflight(), RequestOutcome::Preflight)
            }
            Classification::Rejected => {
                self.local_answer(&state, EdgeError::MethodNotAllowed(method.to_string()))
            }
            Classification::Maintenance | Classification::NotFound => {
                self.local_answer(&state, EdgeError::OutOfScopePath(path.to_string()))
            }
            Classification::Proceed(key) => self.fetch_through(&state, method, key).await,
        };

        let mut response = state.builder.apply_cors(response);
        if matches!(outcome, RequestOutcome::CacheHit | RequestOutcome::CacheMiss) {
            response.headers.insert(
                HeaderName::from_static(X_CACHE_STATUS),
                HeaderValue::from_static(if outcome == RequestOutcome::CacheHit {
                    "HIT"
                } else {
                    "MISS"
                }),
            );
        }
        if method == Method::HEAD {
            response = response.without_body();
        }

        let elapsed = start.elapsed();
        self.metrics.record_bytes_to_client(response.body.len() as u64);
        self.metrics.record_request_duration(elapsed);
        self.logging(method, path, &response, outcome, elapsed);

        response
    }

    async fn fetch_through(
        &self,
        state: &ProxyState,
        method: &Method,
        key: CacheKey,
    ) -> (EdgeResponse, RequestOutcome) {
        let url = match state.fetcher.resolve(&key) {
            Ok(url) => url,
            Err(e) if e.is_local_rejection() => return self.local_answer(state, e),
            Err(e) => {
                warn!("Cannot build origin URL for key={}: {}", key, e);
                return (state.builder.bad_gateway(), RequestOutcome::OriginUnreachable);
            }
        };

        if let Some(cached) = self.lookup(&key).await {
            self.metrics.record_cache_hit();
            self.metrics.record_bytes_from_cache(cached.body.len() as u64);
            return (cached, RequestOutcome::CacheHit);
        }
        self.metrics.record_cache_miss();

        let fetch_start = Instant::now();
        let upstream = match state.fetcher.fetch(method, url).await {
            Ok(upstream) => upstream,
            Err(e) => {
                self.metrics.record_origin_unreachable(fetch_start.elapsed());
                warn!("Origin unreachable for key={}: {}", key, e);
                return (state.builder.bad_gateway(), RequestOutcome::OriginUnreachable);
            }
        };
        self.metrics
            .record_origin_fetch(upstream.is_ok(), fetch_start.elapsed());
        self.metrics.record_bytes_from_origin(upstream.body.len() as u64);

        let built = state.builder.build(upstream);
        match built.cache_copy {
            // A HEAD result has no body; storing it would poison later GETs
            Some(copy) if method == Method::GET => self.schedule_write(key, copy),
            Some(_) => debug!("Not caching HEAD result for key={}", key),
            None => {}
        }

        (built.response, RequestOutcome::CacheMiss)
    }

    /// Answer a request rejected before cache or origin were consulted
    fn local_answer(
        &self,
        state: &ProxyState,
        rejection: EdgeError,
    ) -> (EdgeResponse, RequestOutcome) {
        debug!("Answering locally: {}", rejection);
        match rejection {
            EdgeError::MethodNotAllowed(_) => {
                self.metrics.record_rejected();
                (state.builder.method_not_allowed(), RequestOutcome::Rejected)
            }
            _ if state.config.maintenance.enabled => {
                self.metrics.record_maintenance();
                (state.builder.maintenance(), RequestOutcome::Maintenance)
            }
            _ => {
                self.metrics.record_maintenance();
                (state.builder.not_found(), RequestOutcome::NotFound)
            }
        }
    }

    /// Cache lookup that treats store failures as a miss
    async fn lookup(&self, key: &CacheKey) -> Option<EdgeResponse> {
        match self.store.lookup(key).await {
            Ok(found) => found,
            Err(e) => {
                self.metrics.record_cache_error();
                warn!("Cache lookup failed, treating as miss: key={}, error={}", key, e);
                None
            }
        }
    }

    /// Persist a response without holding up the caller
    fn schedule_write(&self, key: CacheKey, response: EdgeResponse) {
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        self.writes.spawn(async move {
            match store.put(&key, response).await {
                Ok(()) => {
                    metrics.record_cache_write(true);
                    debug!("Cache populated: key={}", key);
                }
                Err(e) => {
                    metrics.record_cache_write(false);
                    warn!("Cache write dropped: key={}, error={}", key, e);
                }
            }
        });
    }

    /// Log request completion
    fn logging(
        &self,
        method: &Method,
        path: &str,
        response: &EdgeResponse,
        outcome: RequestOutcome,
        elapsed: Duration,
    ) {
        match outcome {
            RequestOutcome::OriginUnreachable => warn!(
                "Request failed: method={}, path={}, status={}, outcome={}, duration_ms={}",
                method,
                path,
                response.status.as_u16(),
                outcome,
                elapsed.as_millis()
            ),
            _ => info!(
                "Request completed: method={}, path={}, status={}, outcome={}, bytes={}, duration_ms={}",
                method,
                path,
                response.status.as_u16(),
                outcome,
                response.body.len(),
                elapsed.as_millis()
            ),
        }
    }
}
