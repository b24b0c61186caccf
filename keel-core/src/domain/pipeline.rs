//! Pipeline domain types
//!
//! A pipeline step is a read-through projection of remote state: the backend
//! creates it when an execution is submitted and every poll refreshes it.

use serde::{Deserialize, Serialize};

use crate::domain::service::{Stage, StepName};

/// Canonical step status
///
/// The backend speaks a wider vocabulary; everything is folded into these
/// four states through [`StepStatus::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    /// Maps a backend status string onto the canonical set
    ///
    /// Unknown values become `Pending`, never `Running`.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" | "in_progress" | "in-progress" | "processing" | "started" | "building"
            | "deploying" => StepStatus::Running,
            "success" | "succeeded" | "successful" | "completed" | "complete" | "done"
            | "finished" => StepStatus::Success,
            "failed" | "failure" | "error" | "errored" | "cancelled" | "canceled" | "aborted"
            | "timeout" | "timed_out" => StepStatus::Failed,
            _ => StepStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Latest known state of one pipeline step of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Backend record identity; higher means newer
    pub id: i64,
    pub service_id: i64,
    pub step_name: StepName,
    /// Status string exactly as reported by the backend
    pub raw_status: String,
    pub status: StepStatus,
    pub progress_percent: Option<u8>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// Picks the latest record for `step_name`, resolving duplicates by highest id
pub fn latest_step(steps: &[PipelineStep], step_name: StepName) -> Option<&PipelineStep> {
    steps
        .iter()
        .filter(|step| step.step_name == step_name)
        .max_by_key(|step| step.id)
}

/// The single in-flight (service, stage) pair the poller watches for completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedExecution {
    pub service_id: i64,
    pub service_name: String,
    pub step_name: StepName,
    pub requested_stage: Stage,
}

impl TrackedExecution {
    /// Whether this execution occupies the given (service, stage) pair
    pub fn targets(&self, service_id: i64, stage: Stage) -> bool {
        self.service_id == service_id && self.requested_stage == stage
    }
}

/// Notification emitted once when a tracked execution reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedExecution {
    pub service_id: i64,
    pub service_name: String,
    pub stage: Stage,
    pub success: bool,
    pub error_message: Option<String>,
}
