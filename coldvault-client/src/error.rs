//! Error types for the fleet client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the fleet API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request never produced a response (DNS, connect, proxy, TLS, timeout)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Endpoint URL is not usable
    #[error("Invalid fleet endpoint: {0}")]
    InvalidEndpoint(String),

    /// SOCKS proxy could not be configured
    #[error("Invalid SOCKS proxy {proxy}: {message}")]
    ProxyError {
        /// Proxy address as configured
        proxy: String,
        /// Reason the proxy was rejected
        message: String,
    },
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if the scheduler could not be reached at all
    ///
    /// Everything else means the scheduler answered but rejected or garbled
    /// the operation.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::RequestFailed(_))
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
