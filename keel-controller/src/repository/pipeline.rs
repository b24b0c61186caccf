//! Pipeline backend repository
//!
//! Handles communication with the pipeline backend:
//! - Batched status fetches for every known service
//! - Build and deploy submission
//! - Security scan lookups

use anyhow::{Context, Result};
use async_trait::async_trait;
use keel_client::BackendClient;
use keel_core::domain::pipeline::PipelineStep;
use keel_core::domain::scan::{ScanCategory, ScanResultEnvelope};
use keel_core::dto::execution::{BuildRequest, DeployRequest};
use std::collections::HashMap;

/// Repository trait for pipeline backend operations
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Fetches the steps of all given services in a single call
    ///
    /// # Arguments
    /// * `service_ids` - Every service the caller knows about
    async fn fetch_pipeline_statuses(
        &self,
        service_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<PipelineStep>>>;

    /// Requests a remote build
    async fn submit_build(&self, req: &BuildRequest) -> Result<()>;

    /// Requests a remote deploy
    async fn submit_deploy(&self, req: &DeployRequest) -> Result<()>;

    /// Fetches stored scans, `None` if the service was never scanned
    async fn fetch_scan_result(
        &self,
        service_id: i64,
        category: ScanCategory,
    ) -> Result<Option<ScanResultEnvelope>>;
}

/// HTTP implementation of PipelineRepository
pub struct HttpPipelineRepository {
    client: BackendClient,
}

impl HttpPipelineRepository {
    /// Creates a new HTTP pipeline repository
    ///
    /// # Arguments
    /// * `client` - Backend client, already configured with its timeout
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PipelineRepository for HttpPipelineRepository {
    async fn fetch_pipeline_statuses(
        &self,
        service_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<PipelineStep>>> {
        self.client
            .fetch_pipeline_statuses(service_ids)
            .await
            .context("Failed to fetch pipeline statuses")
    }

    async fn submit_build(&self, req: &BuildRequest) -> Result<()> {
        self.client
            .submit_build(req)
            .await
            .context("Failed to submit build")
    }

    async fn submit_deploy(&self, req: &DeployRequest) -> Result<()> {
        self.client
            .submit_deploy(req)
            .await
            .context("Failed to submit deploy")
    }

    async fn fetch_scan_result(
        &self,
        service_id: i64,
        category: ScanCategory,
    ) -> Result<Option<ScanResultEnvelope>> {
        self.client
            .fetch_scan_result(service_id, category)
            .await
            .with_context(|| format!("Failed to fetch {} scan result", category))
    }
}
