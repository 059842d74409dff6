//! Configuration management for the edge image cache

use crate::error::{EdgeError, Result};
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding file settings
///
/// `EDGE_ORIGIN_BASE_URL`, `EDGE_ORIGIN_CREDENTIAL`, ...; nested keys use a
/// double underscore (`EDGE_MAINTENANCE__ENABLED`).
pub const ENV_PREFIX: &str = "EDGE";

/// Configuration for the edge cache
///
/// Every field has a default so a minimal YAML file only needs to name the
/// origin. The configuration is treated as immutable once a request starts;
/// reloading swaps in a whole new value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeConfig {
    /// Address the proxy listens on (default: 0.0.0.0:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Base URL of the origin object store, without trailing slash
    #[serde(default = "default_origin_base_url")]
    pub origin_base_url: String,

    /// Static credential forwarded to origin on every fetch
    #[serde(default)]
    pub origin_credential: Option<String>,

    /// Header name used for the origin credential (default: apikey)
    #[serde(default = "default_credential_header")]
    pub origin_credential_header: String,

    /// Origin request timeout in seconds (default: 10)
    #[serde(default = "default_origin_timeout")]
    pub origin_timeout_secs: u64,

    /// Cache epoch tag; bump it to invalidate every cached entry at once
    #[serde(default = "default_cache_epoch")]
    pub cache_epoch: String,

    /// TTL for successful image-like responses (default: 1 year)
    #[serde(default = "default_long_ttl")]
    pub long_ttl_secs: u64,

    /// TTL for everything else, errors included (default: 60s)
    #[serde(default = "default_short_ttl")]
    pub short_ttl_secs: u64,

    /// Path prefix that is proxied to origin (default: /storage/)
    #[serde(default = "default_proxy_prefix")]
    pub proxy_prefix: String,

    /// Maintenance gating for paths outside the proxy prefix
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Value of the X-Served-By marker header
    #[serde(default = "default_served_by")]
    pub served_by: String,

    /// Additional origin headers to strip, on top of the built-in set
    #[serde(default)]
    pub strip_headers: Vec<String>,

    /// Upper bound for the in-memory cache store in bytes (0 = unbounded)
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size_bytes: usize,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Maintenance page settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceConfig {
    /// Serve the maintenance page (503) for out-of-scope paths; 404 otherwise
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Retry-After hint in seconds (default: 86400)
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,

    /// Optional HTML file replacing the built-in maintenance page
    #[serde(default)]
    pub page_path: Option<String>,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            retry_after_secs: default_retry_after(),
            page_path: None,
        }
    }
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

// Default value functions for serde
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_origin_base_url() -> String {
    "http://127.0.0.1:9000".to_string()
}

fn default_credential_header() -> String {
    "apikey".to_string()
}

fn default_origin_timeout() -> u64 {
    10
}

fn default_cache_epoch() -> String {
    "v1".to_string()
}

fn default_long_ttl() -> u64 {
    60 * 60 * 24 * 365 // 1 year
}

fn default_short_ttl() -> u64 {
    60
}

fn default_proxy_prefix() -> String {
    "/storage/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_after() -> u64 {
    86400
}

fn default_served_by() -> String {
    "edge-image-cache".to_string()
}

fn default_cache_max_size() -> usize {
    256 * 1024 * 1024 // 256MB
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for EdgeConfig {
    fn default() -> Self {
        EdgeConfig {
            listen_address: default_listen_address(),
            origin_base_url: default_origin_base_url(),
            origin_credential: None,
            origin_credential_header: default_credential_header(),
            origin_timeout_secs: default_origin_timeout(),
            cache_epoch: default_cache_epoch(),
            long_ttl_secs: default_long_ttl(),
            short_ttl_secs: default_short_ttl(),
            proxy_prefix: default_proxy_prefix(),
            maintenance: MaintenanceConfig::default(),
            served_by: default_served_by(),
            strip_headers: Vec::new(),
            cache_max_size_bytes: default_cache_max_size(),
            metrics_endpoint: None,
        }
    }
}

impl EdgeConfig {
    /// Load configuration from a YAML file
    ///
    /// `EDGE_*` environment variables are layered over the file before
    /// validation, so the origin credential can stay out of the file.
    ///
    /// # Returns
    /// * `Ok(EdgeConfig)` if loading and validation succeed
    /// * `Err(EdgeError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path, Self::environment())
    }

    fn environment() -> Environment {
        // No try_parsing: values stay strings so credentials are never
        // reinterpreted as numbers; typed fields convert on deserialize.
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    fn load<P: AsRef<Path>>(path: P, environment: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(
                File::from(path.as_ref())
                    .format(FileFormat::Yaml)
                    .required(true),
            )
            .add_source(environment)
            .build()
            .map_err(|e| EdgeError::ConfigError(format!("Failed to load config file: {}", e)))?;

        let config: EdgeConfig = settings
            .try_deserialize()
            .map_err(|e| EdgeError::ConfigError(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - origin_base_url must be http(s) and must not end with '/'
    /// - cache_epoch must be non-empty and URL-safe
    /// - both TTLs must be > 0 and short_ttl_secs <= long_ttl_secs
    /// - proxy_prefix must start with '/'
    /// - origin_timeout_secs must be > 0
    pub fn validate(&self) -> Result<()> {
        if !(self.origin_base_url.starts_with("http://")
            || self.origin_base_url.starts_with("https://"))
        {
            return Err(EdgeError::ConfigError(format!(
                "origin_base_url must start with http:// or https://, got '{}'",
                self.origin_base_url
            )));
        }

        if self.origin_base_url.ends_with('/') {
            return Err(EdgeError::ConfigError(
                "origin_base_url must not end with '/'".to_string(),
            ));
        }

        if self.cache_epoch.is_empty() {
            return Err(EdgeError::ConfigError(
                "cache_epoch must not be empty".to_string(),
            ));
        }

        if !self
            .cache_epoch
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(EdgeError::ConfigError(format!(
                "cache_epoch may only contain [A-Za-z0-9._-], got '{}'",
                self.cache_epoch
            )));
        }

        if self.long_ttl_secs == 0 || self.short_ttl_secs == 0 {
            return Err(EdgeError::ConfigError(
                "long_ttl_secs and short_ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.short_ttl_secs > self.long_ttl_secs {
            return Err(EdgeError::ConfigError(format!(
                "short_ttl_secs ({}) must not exceed long_ttl_secs ({})",
                self.short_ttl_secs, self.long_ttl_secs
            )));
        }

        if !self.proxy_prefix.starts_with('/') {
            return Err(EdgeError::ConfigError(format!(
                "proxy_prefix must start with '/', got '{}'",
                self.proxy_prefix
            )));
        }

        if self.origin_timeout_secs == 0 {
            return Err(EdgeError::ConfigError(
                "origin_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.origin_credential_header.is_empty()
            || http::HeaderName::from_bytes(self.origin_credential_header.as_bytes()).is_err()
        {
            return Err(EdgeError::ConfigError(format!(
                "origin_credential_header is not a valid header name: '{}'",
                self.origin_credential_header
            )));
        }

        if http::HeaderValue::from_str(&self.served_by).is_err() {
            return Err(EdgeError::ConfigError(format!(
                "served_by is not a valid header value: '{}'",
                self.served_by
            )));
        }

        Ok(())
    }

    /// Update configuration from another config
    ///
    /// # Returns
    /// * `Ok(ConfigChanges)` - Description of what changed
    /// * `Err(EdgeError)` - If the new configuration is invalid
    pub fn update_from(&mut self, new_config: &EdgeConfig) -> Result<ConfigChanges> {
        new_config.validate()?;

        let changes = ConfigChanges {
            listen_address_changed: self.listen_address != new_config.listen_address,
            origin_changed: self.origin_base_url != new_config.origin_base_url
                || self.origin_credential != new_config.origin_credential
                || self.origin_credential_header != new_config.origin_credential_header
                || self.origin_timeout_secs != new_config.origin_timeout_secs,
            epoch_changed: self.cache_epoch != new_config.cache_epoch,
            ttl_changed: self.long_ttl_secs != new_config.long_ttl_secs
                || self.short_ttl_secs != new_config.short_ttl_secs,
            prefix_changed: self.proxy_prefix != new_config.proxy_prefix,
            maintenance_changed: self.maintenance != new_config.maintenance,
            headers_changed: self.served_by != new_config.served_by
                || self.strip_headers != new_config.strip_headers,
            metrics_endpoint_changed: self.metrics_endpoint != new_config.metrics_endpoint,
        };

        *self = new_config.clone();
        Ok(changes)
    }

    /// Reload configuration from file and apply changes
    pub fn reload_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<ConfigChanges> {
        let new_config = Self::from_file(path)?;
        self.update_from(&new_config)
    }
}

/// Description of configuration changes after hot reload
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigChanges {
    pub listen_address_changed: bool,
    pub origin_changed: bool,
    pub epoch_changed: bool,
    pub ttl_changed: bool,
    pub prefix_changed: bool,
    pub maintenance_changed: bool,
    pub headers_changed: bool,
    pub metrics_endpoint_changed: bool,
}

impl ConfigChanges {
    /// Check if any configuration changed
    pub fn has_changes(&self) -> bool {
        self.listen_address_changed
            || self.origin_changed
            || self.epoch_changed
            || self.ttl_changed
            || self.prefix_changed
            || self.maintenance_changed
            || self.headers_changed
            || self.metrics_endpoint_changed
    }

    /// Whether the change only takes effect after a restart
    pub fn requires_restart(&self) -> bool {
        self.listen_address_changed || self.metrics_endpoint_changed
    }

    /// Human-readable list of changes
    pub fn summary(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.listen_address_changed {
            out.push("listen address (restart required)".to_string());
        }
        if self.origin_changed {
            out.push("origin".to_string());
        }
        if self.epoch_changed {
            out.push("cache epoch".to_string());
        }
        if self.ttl_changed {
            out.push("ttl".to_string());
        }
        if self.prefix_changed {
            out.push("proxy prefix".to_string());
        }
        if self.maintenance_changed {
            out.push("maintenance".to_string());
        }
        if self.headers_changed {
            out.push("response headers".to_string());
        }
        if self.metrics_endpoint_changed {
            out.push("metrics endpoint (restart required)".to_string());
        }
        out
    }
}
