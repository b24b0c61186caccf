//! Controller configuration
//!
//! Defines the configurable parameters of the controller: backend connection,
//! polling cadence and where credentials are loaded from.

use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
///
/// Intervals are configurable to allow tuning for different deployments
/// (local backend vs remote, fast vs slow pipelines).
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (e.g., "http://localhost:8080")
    pub api_url: String,

    /// How often to poll the backend for pipeline statuses
    pub poll_interval: Duration,

    /// Ticks to keep polling once nothing is running
    pub grace_ticks: u32,

    /// Per-request timeout enforced by the HTTP transport
    pub request_timeout: Duration,

    /// JSON file holding git, server and registry credentials
    pub credentials_path: Option<PathBuf>,
}

impl Config {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_GRACE_TICKS: u32 = 6;
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new configuration with defaults
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            grace_ticks: Self::DEFAULT_GRACE_TICKS,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            credentials_path: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - KEEL_API_URL (required)
    /// - KEEL_POLL_INTERVAL (optional, seconds, default: 5)
    /// - KEEL_GRACE_TICKS (optional, default: 6)
    /// - KEEL_REQUEST_TIMEOUT (optional, seconds, default: 30)
    /// - KEEL_CREDENTIALS (optional, path to credentials JSON)
    pub fn from_env() -> anyhow::Result<Self> {
        let api_url = std::env::var("KEEL_API_URL")
            .map_err(|_| anyhow::anyhow!("KEEL_API_URL environment variable not set"))?;

        let poll_interval = std::env::var("KEEL_POLL_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_POLL_INTERVAL);

        let grace_ticks = std::env::var("KEEL_GRACE_TICKS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(Self::DEFAULT_GRACE_TICKS);

        let request_timeout = std::env::var("KEEL_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Self::DEFAULT_REQUEST_TIMEOUT);

        let credentials_path = std::env::var("KEEL_CREDENTIALS").ok().map(PathBuf::from);

        Ok(Self {
            api_url,
            poll_interval,
            grace_ticks,
            request_timeout,
            credentials_path,
        })
    }

    /// Sets the credentials file
    pub fn with_credentials(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_url.is_empty() {
            anyhow::bail!("api_url cannot be empty");
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            anyhow::bail!("api_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:8080".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.grace_ticks, 6);
        assert!(config.credentials_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.api_url = String::new();
        assert!(config.validate().is_err());

        config.api_url = "ftp://backend".to_string();
        assert!(config.validate().is_err());

        config.api_url = "https://backend.internal".to_string();
        assert!(config.validate().is_ok());

        config.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_credentials() {
        let config = Config::default().with_credentials("/etc/keel/credentials.json");
        assert_eq!(
            config.credentials_path,
            Some(PathBuf::from("/etc/keel/credentials.json"))
        );
    }
}
