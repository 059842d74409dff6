//! Edge Image Cache
//!
//! A read-through HTTP cache that sits in front of an object-storage origin
//! and serves user-uploaded images to browsers.
//!
//! # Overview
//!
//! Every inbound request is classified first. CORS preflights are answered
//! locally, unsupported methods get a 405, and paths outside the storage
//! prefix get the maintenance page. Everything else is looked up in the
//! cache under a key that includes the current cache epoch; on a miss the
//! object is fetched from origin with a server-side credential, its headers
//! are cleaned up and stamped with cache directives, and a copy is written
//! back to the cache in the background.
//!
//! # Features
//!
//! - **Epoch-based invalidation**: bumping `cache_epoch` makes every stored
//!   entry unreachable without touching the store
//! - **Content-aware TTLs**: images are cached for a year, everything else
//!   for the short TTL, and errors are never stored
//! - **Credential isolation**: the origin credential is attached on the way
//!   out and never reaches the client
//! - **Fail-open cache**: store errors are served as misses
//! - **Hot reload**: configuration can be swapped while serving
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use edge_image_cache::{EdgeConfig, EdgeProxy, EdgeServer};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EdgeConfig::from_file("edge_cache.yaml")?;
//! let addr = config.listen_address.parse()?;
//! let proxy = EdgeProxy::new(Arc::new(config))?;
//!
//! EdgeServer::new(proxy, addr)
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`RequestClassifier`]: method and path gating, cache key construction
//! - [`CacheStore`]: lookup/put seam, with [`MemoryCacheStore`] as the default
//! - [`OriginFetcher`]: authenticated fetch from the origin store
//! - [`ResponseBuilder`]: header sanitation, cache directives, CORS
//! - [`EdgeProxy`]: ties the stages together per request
//! - [`EdgeServer`]: HTTP/1.1 front end
//! - [`EdgeMetrics`] / [`MetricsEndpoint`]: counters and Prometheus export
//!
//! # Configuration
//!
//! ```yaml
//! listen_address: "0.0.0.0:8080"
//! origin_base_url: "https://project.supabase.co"
//! cache_epoch: "v2"
//! long_ttl_secs: 31536000
//! short_ttl_secs: 60
//! proxy_prefix: "/storage/"
//! ```
//!
//! Any field can be overridden from the environment with an `EDGE_` prefix,
//! e.g. `EDGE_ORIGIN_BASE_URL` and `EDGE_ORIGIN_CREDENTIAL`.

pub mod background;
pub mod cache;
pub mod cache_policy;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod metrics_endpoint;
pub mod models;
pub mod origin_fetcher;
pub mod proxy;
pub mod request_classifier;
pub mod response_builder;
pub mod server;

// Re-export commonly used types
pub use background::BackgroundWrites;
pub use cache::{CacheStats, CacheStore, MemoryCacheStore};
pub use cache_policy::{CachePolicy, PolicyDecision};
pub use crate::config::{ConfigChanges, EdgeConfig, MaintenanceConfig, MetricsEndpointConfig};
pub use error::{EdgeError, Result};
pub use maintenance::MaintenancePage;
pub use metrics::{EdgeMetrics, MetricsSnapshot};
pub use metrics_endpoint::MetricsEndpoint;
pub use models::{CacheKey, EdgeResponse, UpstreamResult};
pub use origin_fetcher::OriginFetcher;
pub use proxy::{EdgeProxy, RequestOutcome};
pub use request_classifier::{Classification, RequestClassifier};
pub use response_builder::{BuiltResponse, ResponseBuilder};
pub use server::EdgeServer;
