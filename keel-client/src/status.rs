//! Pipeline status endpoints

use keel_core::domain::pipeline::PipelineStep;
use keel_core::dto::pipeline::{StatusBatchRequest, StatusBatchResponse};
use std::collections::HashMap;

use crate::BackendClient;
use crate::error::Result;

impl BackendClient {
    // =============================================================================
    // Pipeline Status
    // =============================================================================

    /// Fetch the pipeline steps of many services in one request
    ///
    /// Status strings are normalized on the way in; services the backend has
    /// no steps for are simply absent from the map.
    ///
    /// # Arguments
    /// * `service_ids` - Every service to report on
    pub async fn fetch_pipeline_statuses(
        &self,
        service_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<PipelineStep>>> {
        if service_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/api/pipelines/status", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&StatusBatchRequest {
                service_ids: service_ids.to_vec(),
            })
            .send()
            .await?;

        let batch: StatusBatchResponse = self.handle_response(response).await?;
        tracing::debug!(
            "Fetched pipeline statuses for {} of {} service(s)",
            batch.statuses.len(),
            service_ids.len()
        );

        Ok(batch.into_steps())
    }
}
