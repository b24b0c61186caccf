//! Security scan endpoints

use keel_core::domain::scan::{ScanCategory, ScanResultEnvelope};

use crate::BackendClient;
use crate::error::Result;

impl BackendClient {
    // =============================================================================
    // Scan Results
    // =============================================================================

    /// Fetch the stored scans of one category for a service
    ///
    /// # Returns
    /// `None` when the backend has never scanned this service in this category
    pub async fn fetch_scan_result(
        &self,
        service_id: i64,
        category: ScanCategory,
    ) -> Result<Option<ScanResultEnvelope>> {
        let url = format!(
            "{}/api/services/{}/scans/{}",
            self.base_url,
            service_id,
            category.as_str()
        );
        let response = self.client.get(&url).send().await?;

        match self.handle_response(response).await {
            Ok(envelope) => Ok(Some(envelope)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::{Json, Router, extract::Path, http::StatusCode, response::IntoResponse, routing::get};

    async fn scans(Path((id, category)): Path<(i64, String)>) -> axum::response::Response {
        if category != "sca" {
            return (StatusCode::NOT_FOUND, "no scans").into_response();
        }
        Json(serde_json::json!({
            "service_id": id,
            "category": "sca",
            "scans": [
                { "artifact": "registry.example.com/api:v1",
                  "tools": { "trivy": { "critical": 1, "high": 0, "medium": 0, "low": 0 } } }
            ]
        }))
        .into_response()
    }

    #[tokio::test]
    async fn test_fetch_scan_result_found_and_missing() -> anyhow::Result<()> {
        let router = Router::new().route("/api/services/{id}/scans/{category}", get(scans));
        let client = BackendClient::new(serve(router).await?);

        let found = client.fetch_scan_result(3, ScanCategory::Sca).await?;
        let envelope = found.expect("sca scans should exist");
        assert_eq!(envelope.service_id, 3);
        assert!(envelope.for_artifact("v1").is_some());

        let missing = client.fetch_scan_result(3, ScanCategory::Sast).await?;
        assert!(missing.is_none());
        Ok(())
    }
}
