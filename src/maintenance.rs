//! Maintenance page served for paths outside the proxy prefix

use crate::config::MaintenanceConfig;
use crate::error::{EdgeError, Result};
use bytes::Bytes;
use std::fs;
use tracing::info;

const DEFAULT_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Under Maintenance</title>
  <style>
    body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; min-height: 100vh;
           display: flex; align-items: center; justify-content: center; margin: 0; }
    .card { text-align: center; padding: 3rem 2rem; max-width: 420px; }
  </style>
</head>
<body>
  <div class="card">
    <h1>Under Maintenance</h1>
    <p>This site is currently under maintenance.<br>We'll be back shortly.</p>
  </div>
</body>
</html>"#;

/// The static maintenance document and its Retry-After hint
#[derive(Debug, Clone)]
pub struct MaintenancePage {
    body: Bytes,
    retry_after_secs: u64,
}

impl MaintenancePage {
    /// Load the page described by configuration
    ///
    /// Falls back to the built-in page when no file is configured.
    pub fn load(config: &MaintenanceConfig) -> Result<Self> {
        let body = match &config.page_path {
            Some(path) => {
                let html = fs::read(path).map_err(|e| {
                    EdgeError::ConfigError(format!(
                        "Failed to read maintenance page '{}': {}",
                        path, e
                    ))
                })?;
                info!("Loaded maintenance page from {} ({} bytes)", path, html.len());
                Bytes::from(html)
            }
            None => Bytes::from_static(DEFAULT_PAGE.as_bytes()),
        };

        Ok(MaintenancePage {
            body,
            retry_after_secs: config.retry_after_secs,
        })
    }

    pub fn body(&self) -> Bytes {
        self.body.clone()
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after_secs
    }
}

impl Default for MaintenancePage {
    fn default() -> Self {
        MaintenancePage {
            body: Bytes::from_static(DEFAULT_PAGE.as_bytes()),
            retry_after_secs: MaintenanceConfig::default().retry_after_secs,
        }
    }
}
