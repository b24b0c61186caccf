//! Scripted in-memory backend shared by controller tests

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use keel_client::ClientError;
use keel_core::domain::pipeline::PipelineStep;
use keel_core::domain::scan::{ScanCategory, ScanResultEnvelope};
use keel_core::domain::service::StepName;
use keel_core::dto::execution::{BuildRequest, DeployRequest};
use keel_core::dto::pipeline::PipelineStepRecord;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::repository::PipelineRepository;

type Snapshot = HashMap<i64, Vec<PipelineStep>>;

#[derive(Clone)]
enum StatusReply {
    Ok(Snapshot),
    Err(String),
}

/// Replays queued status replies; the last one repeats once the queue drains
#[derive(Default)]
pub(crate) struct FakeRepository {
    replies: Mutex<VecDeque<StatusReply>>,
    last_reply: Mutex<Option<StatusReply>>,
    delays: Mutex<VecDeque<Duration>>,
    status_calls: Mutex<Vec<Vec<i64>>>,
    submit_error: Mutex<Option<String>>,
    submit_status: Mutex<Option<(u16, String)>>,
    builds: Mutex<Vec<BuildRequest>>,
    deploys: Mutex<Vec<DeployRequest>>,
    scans: Mutex<HashMap<(i64, ScanCategory), ScanResultEnvelope>>,
    scan_error: Mutex<Option<String>>,
}

impl FakeRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_statuses(&self, snapshot: Snapshot) {
        self.replies
            .lock()
            .unwrap()
            .push_back(StatusReply::Ok(snapshot));
    }

    pub(crate) fn push_status_error(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(StatusReply::Err(message.to_string()));
    }

    /// Delays the next status call by `delay`
    pub(crate) fn push_delay(&self, delay: Duration) {
        self.delays.lock().unwrap().push_back(delay);
    }

    pub(crate) fn status_calls(&self) -> Vec<Vec<i64>> {
        self.status_calls.lock().unwrap().clone()
    }

    pub(crate) fn fail_submissions(&self, message: &str) {
        *self.submit_error.lock().unwrap() = Some(message.to_string());
    }

    /// Fails submissions with a typed backend status, as the HTTP client would
    pub(crate) fn reject_submissions(&self, status: u16, message: &str) {
        *self.submit_status.lock().unwrap() = Some((status, message.to_string()));
    }

    pub(crate) fn accept_submissions(&self) {
        *self.submit_error.lock().unwrap() = None;
        *self.submit_status.lock().unwrap() = None;
    }

    pub(crate) fn builds(&self) -> Vec<BuildRequest> {
        self.builds.lock().unwrap().clone()
    }

    pub(crate) fn deploys(&self) -> Vec<DeployRequest> {
        self.deploys.lock().unwrap().clone()
    }

    pub(crate) fn put_scan(&self, envelope: ScanResultEnvelope) {
        self.scans
            .lock()
            .unwrap()
            .insert((envelope.service_id, envelope.category), envelope);
    }

    pub(crate) fn fail_scans(&self, message: &str) {
        *self.scan_error.lock().unwrap() = Some(message.to_string());
    }

    fn next_reply(&self) -> StatusReply {
        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last_reply.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone().unwrap_or_else(|| StatusReply::Ok(HashMap::new()))
    }

    fn submission_result(&self) -> Result<()> {
        if let Some((status, message)) = self.submit_status.lock().unwrap().clone() {
            return Err(anyhow::Error::new(ClientError::api_error(status, message))
                .context("Failed to submit execution"));
        }
        match self.submit_error.lock().unwrap().clone() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PipelineRepository for FakeRepository {
    async fn fetch_pipeline_statuses(&self, service_ids: &[i64]) -> Result<Snapshot> {
        self.status_calls.lock().unwrap().push(service_ids.to_vec());
        let reply = self.next_reply();

        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            StatusReply::Ok(snapshot) => Ok(snapshot),
            StatusReply::Err(message) => Err(anyhow!(message)),
        }
    }

    async fn submit_build(&self, req: &BuildRequest) -> Result<()> {
        self.builds.lock().unwrap().push(req.clone());
        self.submission_result()
    }

    async fn submit_deploy(&self, req: &DeployRequest) -> Result<()> {
        self.deploys.lock().unwrap().push(req.clone());
        self.submission_result()
    }

    async fn fetch_scan_result(
        &self,
        service_id: i64,
        category: ScanCategory,
    ) -> Result<Option<ScanResultEnvelope>> {
        if let Some(message) = self.scan_error.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }
        Ok(self
            .scans
            .lock()
            .unwrap()
            .get(&(service_id, category))
            .cloned())
    }
}

/// A step as the backend would report it, status normalized on the way in
pub(crate) fn step(id: i64, service_id: i64, step_name: StepName, status: &str) -> PipelineStep {
    PipelineStep::from(PipelineStepRecord {
        id,
        service_id,
        step_name,
        status: status.to_string(),
        progress_percent: None,
        started_at: None,
        completed_at: None,
        error_message: None,
        details: None,
    })
}

pub(crate) fn snapshot(entries: &[(i64, Vec<PipelineStep>)]) -> Snapshot {
    entries.iter().cloned().collect()
}
