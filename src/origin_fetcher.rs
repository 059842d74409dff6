//! Origin fetcher for retrieving objects from the origin store

use crate::config::EdgeConfig;
use crate::error::{EdgeError, Result};
use crate::models::{CacheKey, UpstreamResult};
use http::{HeaderName, HeaderValue, Method};
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

/// OriginFetcher issues GET/HEAD requests to the origin store
///
/// Every non-transport outcome is returned as an [`UpstreamResult`], whatever
/// its status. Connect failures and timeouts become
/// [`EdgeError::OriginUnreachable`]. No retries are attempted.
pub struct OriginFetcher {
    client: Client,
    base_url: String,
    /// Path every resolved origin URL must stay under
    scope: String,
    credential: Option<(HeaderName, HeaderValue)>,
}

impl OriginFetcher {
    /// Create a new OriginFetcher from configuration
    pub fn new(config: &EdgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.origin_timeout_secs))
            .build()
            .map_err(|e| EdgeError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        let credential = match &config.origin_credential {
            Some(secret) => {
                let name = HeaderName::from_bytes(config.origin_credential_header.as_bytes())
                    .map_err(|e| {
                        EdgeError::ConfigError(format!("Invalid credential header name: {}", e))
                    })?;
                let mut value = HeaderValue::from_str(secret).map_err(|e| {
                    EdgeError::ConfigError(format!("Invalid credential header value: {}", e))
                })?;
                value.set_sensitive(true);
                Some((name, value))
            }
            None => None,
        };

        let base = Url::parse(&config.origin_base_url).map_err(|e| {
            EdgeError::ConfigError(format!("Invalid origin_base_url: {}", e))
        })?;
        let scope = format!("{}{}", base.path().trim_end_matches('/'), config.proxy_prefix);

        Ok(OriginFetcher {
            client,
            base_url: config.origin_base_url.clone(),
            scope,
            credential,
        })
    }

    /// Full origin URL for a cache key
    pub fn origin_url(&self, key: &CacheKey) -> String {
        format!("{}{}", self.base_url, key.origin_path_and_query())
    }

    /// Parse the origin URL for a key and check it stays under the proxy prefix
    ///
    /// The check runs on the URL as the client will send it, after its own
    /// dot-segment and separator handling.
    ///
    /// # Returns
    /// * `Err(EdgeError::OutOfScopePath)` if the parsed path left the prefix
    /// * `Err(EdgeError::HttpError)` if the URL does not parse
    pub fn resolve(&self, key: &CacheKey) -> Result<Url> {
        let raw = self.origin_url(key);
        let url = Url::parse(&raw)
            .map_err(|e| EdgeError::HttpError(format!("Invalid origin URL '{}': {}", raw, e)))?;

        if !url.path().starts_with(&self.scope) {
            warn!(
                "Origin URL outside proxy prefix: key={}, resolved_path={}, scope={}",
                key,
                url.path(),
                self.scope
            );
            return Err(EdgeError::OutOfScopePath(url.path().to_string()));
        }
        Ok(url)
    }

    /// Fetch an object from origin
    ///
    /// # Arguments
    /// * `method` - GET or HEAD, forwarded as-is
    /// * `url` - Origin URL from [`OriginFetcher::resolve`]
    ///
    /// # Returns
    /// * `Ok(UpstreamResult)` for any HTTP response, including 4xx/5xx
    /// * `Err(EdgeError::OriginUnreachable)` if no response could be obtained
    pub async fn fetch(&self, method: &Method, url: Url) -> Result<UpstreamResult> {
        debug!("Fetching from origin: method={}, url={}", method, url);

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some((name, value)) = &self.credential {
            request = request.header(name.clone(), value.clone());
        }

        let response = request.send().await.map_err(|e| {
            warn!("Origin request failed: method={}, url={}, error={}", method, url, e);
            EdgeError::OriginUnreachable(e.to_string())
        })?;

        let status = response.status();
        let headers = response.headers().clone();

        // A body cut off mid-transfer is as unreachable as a refused connect
        let body = response.bytes().await.map_err(|e| {
            warn!("Origin body read failed: url={}, error={}", url, e);
            EdgeError::OriginUnreachable(format!("body read failed: {}", e))
        })?;

        if status.is_success() {
            info!(
                "Origin responded: url={}, status={}, bytes={}",
                url,
                status,
                body.len()
            );
        } else {
            warn!("Origin returned error status: url={}, status={}", url, status);
        }

        Ok(UpstreamResult::new(status, headers, body))
    }
}
