//! Keel HTTP Client
//!
//! A small, type-safe HTTP client for the pipeline backend API.
//!
//! The controller talks to the backend exclusively through this crate:
//! batched status polling, build and deploy submission, and scan lookups.
//!
//! # Example
//!
//! ```no_run
//! use keel_client::BackendClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), keel_client::ClientError> {
//!     let client = BackendClient::new("http://localhost:8080");
//!
//!     let statuses = client.fetch_pipeline_statuses(&[1, 2, 3]).await?;
//!     println!("Fetched statuses for {} service(s)", statuses.len());
//!     Ok(())
//! }
//! ```

pub mod error;
mod executions;
mod scans;
mod status;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// HTTP client for the pipeline backend API
///
/// Endpoints are grouped by concern:
/// - Pipeline status (batched polling)
/// - Execution submission (build, deploy)
/// - Security scan results
#[derive(Debug, Clone)]
pub struct BackendClient {
    /// Base URL of the backend (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl BackendClient {
    /// Create a new backend client
    ///
    /// # Example
    /// ```
    /// use keel_client::BackendClient;
    ///
    /// let client = BackendClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a backend client whose requests time out after `timeout`
    ///
    /// Timeouts are owned by the transport; callers above this layer never
    /// add their own.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a new backend client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, default headers, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the backend
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
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

    /// Check the status code of a response whose body is ignored
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


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BackendClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BackendClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_timeout() {
        let client = BackendClient::with_timeout("http://localhost:8080", Duration::from_secs(3))
            .expect("client should build");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
