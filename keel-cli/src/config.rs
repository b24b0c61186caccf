//! Configuration module
//!
//! Turns CLI arguments into controller settings and wires up the controller
//! stack from them.

use anyhow::{Context, Result};
use keel_client::BackendClient;
use keel_controller::{
    CredentialFile, CredentialResolver, CredentialStores, ExecutionController,
    HttpPipelineRepository, PipelinePoller, PipelineRepository, PollSettings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub controller: keel_controller::Config,
}

impl Config {
    /// Builds and validates the configuration
    pub fn from_args(
        api_url: String,
        credentials: Option<PathBuf>,
        poll_interval_secs: u64,
        grace_ticks: u32,
        request_timeout_secs: u64,
    ) -> Result<Self> {
        let mut controller = keel_controller::Config::new(api_url);
        controller.poll_interval = Duration::from_secs(poll_interval_secs);
        controller.grace_ticks = grace_ticks;
        controller.request_timeout = Duration::from_secs(request_timeout_secs);
        if let Some(path) = credentials {
            controller = controller.with_credentials(path);
        }

        controller.validate().context("Invalid configuration")?;

        Ok(Self { controller })
    }

    /// HTTP client with the configured timeout
    pub fn client(&self) -> Result<BackendClient> {
        BackendClient::with_timeout(&self.controller.api_url, self.controller.request_timeout)
            .context("Failed to create backend client")
    }

    pub fn repository(&self) -> Result<Arc<dyn PipelineRepository>> {
        Ok(Arc::new(HttpPipelineRepository::new(self.client()?)))
    }

    /// Credential stores loaded from the configured file, empty without one
    pub fn credential_stores(&self) -> Result<CredentialStores> {
        match &self.controller.credentials_path {
            Some(path) => Ok(CredentialFile::load(path)?.into_stores()),
            None => {
                debug!("No credentials file configured, using empty stores");
                Ok(CredentialStores::empty())
            }
        }
    }

    /// Full controller stack: repository, resolver and poller
    pub fn controller(&self) -> Result<ExecutionController> {
        let repository = self.repository()?;
        let poller = PipelinePoller::new(
            Arc::clone(&repository),
            PollSettings::from(&self.controller),
        );
        let resolver = CredentialResolver::new(self.credential_stores()?);
        Ok(ExecutionController::new(repository, resolver, poller))
    }
}
