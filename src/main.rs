//! Edge Image Cache Server
//!
//! Loads configuration, sets up logging, and serves the edge cache until
//! interrupted. SIGHUP reloads the configuration file in place.

use anyhow::Context;
use edge_image_cache::{EdgeConfig, EdgeProxy, EdgeServer, MetricsEndpoint};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Main entry point for the edge cache server
///
/// # Usage
/// ```bash
/// # Start with default config (edge_cache.yaml)
/// edge-image-cache
///
/// # Start with custom config
/// edge-image-cache /path/to/config.yaml
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Edge Image Cache");

    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "edge_cache.yaml".to_string());

    info!("Loading configuration from: {}", config_path);

    let config = EdgeConfig::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    info!("Configuration loaded successfully");
    info!("  - Listen address: {}", config.listen_address);
    info!("  - Origin: {}", config.origin_base_url);
    info!("  - Origin credential: {}", if config.origin_credential.is_some() { "set" } else { "not set" });
    info!("  - Cache epoch: {}", config.cache_epoch);
    info!("  - TTL: long={}s, short={}s", config.long_ttl_secs, config.short_ttl_secs);
    info!("  - Proxy prefix: {}", config.proxy_prefix);
    info!("  - Maintenance page: {}", config.maintenance.enabled);

    let listen: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen_address '{}'", config.listen_address))?;

    let proxy = EdgeProxy::new(Arc::new(config.clone()))?;

    if let Some(endpoint_config) = config.metrics_endpoint.as_ref().filter(|m| m.enabled) {
        let addr: SocketAddr = endpoint_config
            .address
            .parse()
            .with_context(|| format!("invalid metrics address '{}'", endpoint_config.address))?;
        let endpoint = MetricsEndpoint::new(proxy.metrics_arc(), addr);
        tokio::spawn(async move {
            if let Err(e) = endpoint.start().await {
                error!("Metrics endpoint failed: {}", e);
            }
        });
    }

    reload_on_hangup(proxy.clone(), config_path);

    EdgeServer::new(proxy, listen)
        .run_until(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Reload the configuration file whenever SIGHUP arrives
#[cfg(unix)]
fn reload_on_hangup(proxy: EdgeProxy, config_path: String) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Config reload on SIGHUP unavailable: {}", e);
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading {}", config_path);
            let result = EdgeConfig::from_file(&config_path)
                .and_then(|new_config| proxy.reload_config(new_config));
            match result {
                Ok(changes) if !changes.has_changes() => info!("Configuration unchanged"),
                Ok(changes) if changes.requires_restart() => {
                    warn!("Some changes only take effect after a restart: {}", changes.summary().join(", "))
                }
                Ok(_) => {}
                Err(e) => error!("Reload failed, keeping current configuration: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
fn reload_on_hangup(_proxy: EdgeProxy, _config_path: String) {}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
