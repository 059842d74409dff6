//! Error types for the edge image cache

use thiserror::Error;

/// Result type alias for edge cache operations
pub type Result<T> = std::result::Result<T, EdgeError>;

/// Error types that can occur while serving a request
#[derive(Error, Debug, Clone)]
pub enum EdgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Path outside proxy prefix: {0}")]
    OutOfScopePath(String),

    #[error("Origin unreachable: {0}")]
    OriginUnreachable(String),

    #[error("Origin returned error status {status}")]
    OriginError { status: u16 },

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),
}

impl From<std::io::Error> for EdgeError {
    fn from(err: std::io::Error) -> Self {
        EdgeError::IoError(err.to_string())
    }
}

impl EdgeError {
    /// Convert error to the HTTP status code presented to the caller
    ///
    /// - Local rejections map to 405 / 503
    /// - An unreachable origin becomes 502 Bad Gateway
    /// - Origin error statuses pass through unchanged
    /// - Everything else is a 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            EdgeError::MethodNotAllowed(_) => 405,
            EdgeError::OutOfScopePath(_) => 503,
            EdgeError::OriginUnreachable(_) => 502,
            EdgeError::OriginError { status } => *status,

            EdgeError::ConfigError(_) => 500,
            EdgeError::CacheError(_) => 500,
            EdgeError::IoError(_) => 500,
            EdgeError::HttpError(_) => 500,
        }
    }

    /// Whether the error was decided locally, without touching cache or origin
    pub fn is_local_rejection(&self) -> bool {
        matches!(
            self,
            EdgeError::MethodNotAllowed(_) | EdgeError::OutOfScopePath(_)
        )
    }
}
