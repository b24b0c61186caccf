//! Pipeline status DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::pipeline::{PipelineStep, StepStatus};
use crate::domain::service::StepName;

/// Batched status request covering every known service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBatchRequest {
    pub service_ids: Vec<i64>,
}

/// Batched status response keyed by service id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusBatchResponse {
    #[serde(default)]
    pub statuses: HashMap<i64, Vec<PipelineStepRecord>>,
}

/// Pipeline step as reported by the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStepRecord {
    pub id: i64,
    pub service_id: i64,
    pub step_name: StepName,
    pub status: String,
    #[serde(default)]
    pub progress_percent: Option<u8>,
    #[serde(default)]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl From<PipelineStepRecord> for PipelineStep {
    fn from(record: PipelineStepRecord) -> Self {
        let status = StepStatus::normalize(&record.status);
        Self {
            id: record.id,
            service_id: record.service_id,
            step_name: record.step_name,
            raw_status: record.status,
            status,
            progress_percent: record.progress_percent,
            started_at: record.started_at,
            completed_at: record.completed_at,
            error_message: record.error_message,
            details: record.details,
        }
    }
}

impl StatusBatchResponse {
    /// Converts the wire response into normalized steps per service
    pub fn into_steps(self) -> HashMap<i64, Vec<PipelineStep>> {
        self.statuses
            .into_iter()
            .map(|(service_id, records)| {
                (
                    service_id,
                    records.into_iter().map(PipelineStep::from).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_status_is_normalized() {
        let json = serde_json::json!({
            "statuses": {
                "7": [
                    { "id": 1, "service_id": 7, "step_name": "build", "status": "completed" },
                    { "id": 2, "service_id": 7, "step_name": "deploy", "status": "canceled" },
                    { "id": 3, "service_id": 7, "step_name": "source", "status": "mystery" }
                ]
            }
        });

        let response: StatusBatchResponse = serde_json::from_value(json).unwrap();
        let steps = response.into_steps();
        let steps = &steps[&7];

        assert_eq!(steps[0].status, StepStatus::Success);
        assert_eq!(steps[0].raw_status, "completed");
        assert_eq!(steps[1].status, StepStatus::Failed);
        assert_eq!(steps[2].status, StepStatus::Pending);
    }
}
