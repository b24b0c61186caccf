//! Execution submission endpoints

use keel_core::dto::execution::{BuildRequest, DeployRequest};

use crate::BackendClient;
use crate::error::{ClientError, Result};

impl BackendClient {
    // =============================================================================
    // Execution Submission
    // =============================================================================

    /// Ask the backend to start a build
    ///
    /// Returns once the backend has accepted the request; progress is
    /// observed through [`BackendClient::fetch_pipeline_statuses`].
    pub async fn submit_build(&self, req: &BuildRequest) -> Result<()> {
        let url = format!("{}/api/services/{}/build", self.base_url, req.service_id);
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_empty_response(response)
            .await
            .map_err(|e| unknown_service(e, req.service_id))
    }

    /// Ask the backend to start a deploy
    pub async fn submit_deploy(&self, req: &DeployRequest) -> Result<()> {
        let url = format!("{}/api/services/{}/deploy", self.base_url, req.service_id);
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_empty_response(response)
            .await
            .map_err(|e| unknown_service(e, req.service_id))
    }
}

/// A 404 on an execution endpoint means the backend does not know the service
fn unknown_service(err: ClientError, service_id: i64) -> ClientError {
    if err.is_not_found() {
        ClientError::NotFound(format!("service {}", service_id))
    } else {
        err
    }
}
