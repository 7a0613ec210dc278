//! Coldvault fleet client
//!
//! A small, type-safe HTTP client for the fleet scheduler API.
//!
//! Only the two operations the backup agent needs are exposed, through the
//! [`UnitApi`] trait: listing unit states and setting a unit's desired state.
//! Keeping them behind a trait lets the agent's orchestration logic run
//! against in-memory fixtures.
//!
//! # Example
//!
//! ```no_run
//! use coldvault_client::{FleetClient, UnitApi};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FleetClient::new("http://localhost:49153")?;
//!
//!     for unit in client.unit_states().await? {
//!         println!("{} is {}", unit.name, unit.active_state);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod units;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use units::UnitApi;

use reqwest::{Client, Proxy, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::info;

/// Upper bound on idle pooled connections kept per fleet host
pub const MAX_IDLE_CONNECTIONS_PER_HOST: usize = 100;

/// TCP dial timeout when tunnelling through a SOCKS proxy
pub const PROXY_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP keepalive interval when tunnelling through a SOCKS proxy
pub const PROXY_KEEPALIVE: Duration = Duration::from_secs(30);

/// TLS handshake budget when tunnelling through a SOCKS proxy
pub const PROXY_TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the fleet API
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FleetClient {
    /// Base URL of the fleet API (e.g., "http://localhost:49153")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl FleetClient {
    /// Create a client talking to fleet directly
    ///
    /// # Arguments
    /// * `endpoint` - The fleet API endpoint (e.g., "http://localhost:49153")
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let base_url = parse_endpoint(endpoint.into())?;
        let client = Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .build()?;

        info!(url = %base_url, "Fleet API client initialized");
        Ok(Self { base_url, client })
    }

    /// Create a client whose every request goes through a SOCKS5 proxy
    ///
    /// reqwest has no separate TLS handshake timeout; its connect timeout
    /// covers both the dial and the handshake, so it is set to the sum of the
    /// two budgets.
    ///
    /// # Arguments
    /// * `endpoint` - The fleet API endpoint
    /// * `socks_proxy` - Proxy address in `IP:PORT` form (a `socks5://` URL is also accepted)
    pub fn with_socks_proxy(endpoint: impl Into<String>, socks_proxy: &str) -> Result<Self> {
        let base_url = parse_endpoint(endpoint.into())?;
        let proxy = socks_proxy_for(socks_proxy)?;

        info!(proxy = %socks_proxy, "Using SOCKS proxy for fleet API");

        let client = Client::builder()
            .proxy(proxy)
            .connect_timeout(PROXY_DIAL_TIMEOUT + PROXY_TLS_HANDSHAKE_TIMEOUT)
            .tcp_keepalive(PROXY_KEEPALIVE)
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS_PER_HOST)
            .build()
            .map_err(|e| ClientError::ProxyError {
                proxy: socks_proxy.to_string(),
                message: e.to_string(),
            })?;

        info!(url = %base_url, "Fleet API client initialized");
        Ok(Self { base_url, client })
    }

    /// Create a client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(endpoint: impl Into<String>, client: Client) -> Result<Self> {
        let base_url = parse_endpoint(endpoint.into())?;
        Ok(Self { base_url, client })
    }

    /// Get the base URL of the fleet API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

/// Checks the endpoint is an http(s) URL and strips any trailing slash
fn parse_endpoint(endpoint: String) -> Result<String> {
    let url = Url::parse(&endpoint)
        .map_err(|e| ClientError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ClientError::InvalidEndpoint(format!(
            "{}: scheme must be http or https",
            endpoint
        )));
    }

    Ok(endpoint.trim_end_matches('/').to_string())
}

fn socks_proxy_for(socks_proxy: &str) -> Result<Proxy> {
    let proxy_url = if socks_proxy.contains("://") {
        socks_proxy.to_string()
    } else {
        format!("socks5://{}", socks_proxy)
    };

    Proxy::all(&proxy_url).map_err(|e| ClientError::ProxyError {
        proxy: socks_proxy.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = FleetClient::new("http://localhost:49153").unwrap();
        assert_eq!(client.base_url(), "http://localhost:49153");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = FleetClient::new("http://localhost:49153/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:49153");
    }

    #[test]
    fn test_client_rejects_non_http_endpoint() {
        let err = FleetClient::new("unix:///var/run/fleet.sock").unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint(_)));

        let err = FleetClient::new("not a url").unwrap_err();
        assert!(matches!(err, ClientError::InvalidEndpoint(_)));
    }

    #[test]
    fn test_client_with_socks_proxy() {
        let client = FleetClient::with_socks_proxy("http://10.0.0.1:49153", "127.0.0.1:1080").unwrap();
        assert_eq!(client.base_url(), "http://10.0.0.1:49153");
    }

    #[test]
    fn test_client_with_custom_client() {
        let client = FleetClient::with_client("http://localhost:49153", Client::new()).unwrap();
        assert_eq!(client.base_url(), "http://localhost:49153");
    }
}
