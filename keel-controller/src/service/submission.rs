//! Execution submission and recovery
//!
//! Drives one user action on (service, stage) through runnability, the
//! security gate and credential resolution, then asks the backend to run it.
//!
//! Recoverable outcomes (gate warning, missing or rejected credentials) keep
//! the pending (service, stage) context so the caller can resubmit after
//! prompting the user. Fatal outcomes clear all in-flight state.

use keel_core::domain::pipeline::{FinishedExecution, TrackedExecution};
use keel_core::domain::service::{Infrastructure, Service, ServiceLink, Stage};
use keel_core::dto::execution::{BuildRequest, DeployRequest};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::error::{SubmissionError, is_credential_failure};
use crate::repository::PipelineRepository;
use crate::scheduler::PipelinePoller;
use crate::service::credentials::{CredentialResolver, ExecutionCredentials, Resolution};
use crate::service::gate::{self, ArtifactSelection, GateDecision};
use crate::service::runnability::{self, REASON_INFRA_NOT_SET, Runnability, RunnabilityInput};

/// Caller-supplied inputs of a submission
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Freshest service-link list the caller has
    pub links: Vec<ServiceLink>,
    /// Target infrastructure with its hop chain
    pub infra: Option<Infrastructure>,
    /// Images to deploy; for build, an optional commit to gate against
    pub selection: ArtifactSelection,
    /// Subservices to build; `None` builds all of them
    pub selected_services: Option<Vec<String>>,
    /// Deploy automatically after a successful build
    pub auto_deploy: bool,
    /// User already confirmed the gate warning for this attempt
    pub confirm_gate: bool,
}

/// (service, stage) context kept across a recoverable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSubmission {
    pub service_id: i64,
    pub stage: Stage,
}

/// Entry point for stage execution requests
pub struct ExecutionController {
    repository: Arc<dyn PipelineRepository>,
    resolver: CredentialResolver,
    poller: PipelinePoller,
    pending: Mutex<Option<PendingSubmission>>,
}

impl ExecutionController {
    /// Creates a new execution controller
    ///
    /// # Arguments
    /// * `repository` - Pipeline backend
    /// * `resolver` - Credential resolver over the injected stores
    /// * `poller` - Status poller that watches submitted executions
    pub fn new(
        repository: Arc<dyn PipelineRepository>,
        resolver: CredentialResolver,
        poller: PipelinePoller,
    ) -> Self {
        Self {
            repository,
            resolver,
            poller,
            pending: Mutex::new(None),
        }
    }

    pub fn poller(&self) -> &PipelinePoller {
        &self.poller
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Context of the last attempt that ended recoverably, if any
    pub fn pending_retry(&self) -> Option<PendingSubmission> {
        *self.lock_pending()
    }

    /// Registers the one-shot completion callback for the tracked execution
    pub fn on_execution_finished(
        &self,
        callback: impl FnOnce(FinishedExecution) + Send + 'static,
    ) {
        self.poller.on_execution_finished(callback);
    }

    /// Runnability of `stage`, taking the current tracked execution into account
    ///
    /// `links` must be the freshest service-link list available.
    pub fn is_runnable(
        &self,
        service: &Service,
        stage: Stage,
        links: &[ServiceLink],
    ) -> Runnability {
        let tracked = self.poller.tracked();
        runnability::is_runnable(&RunnabilityInput {
            service,
            stage,
            links,
            git_credentials: self.resolver.stores().git.as_ref(),
            tracked: tracked.as_ref(),
        })
    }

    /// Fetches the relevant scans and evaluates the gate for `stage`
    ///
    /// Stages without a gate are always clear. A failed fetch also yields
    /// `Clear`: availability wins over strict gating.
    pub async fn evaluate_gate(
        &self,
        service: &Service,
        stage: Stage,
        selection: &ArtifactSelection,
    ) -> GateDecision {
        let Some(category) = gate::category_for(stage) else {
            return GateDecision::Clear;
        };

        // Build: a selected commit, otherwise the newest source scan
        let artifacts = selection.artifacts();

        match self.repository.fetch_scan_result(service.id, category).await {
            Ok(result) => gate::evaluate(category, stage, result.as_ref(), &artifacts),
            Err(e) => {
                warn!(
                    "Could not fetch {} results for {}, not gating {}: {:#}",
                    category, service.name, stage, e
                );
                GateDecision::Clear
            }
        }
    }

    /// Submits `stage` of `service` for remote execution
    ///
    /// On success the execution becomes the tracked execution and the poller
    /// is (re)started.
    pub async fn submit(
        &self,
        service: &Service,
        stage: Stage,
        options: SubmitOptions,
    ) -> Result<(), SubmissionError> {
        let step_name = match (stage, stage.step()) {
            (Stage::Build | Stage::Deploy, Some(step_name)) => step_name,
            _ => return Err(SubmissionError::UnsupportedStage(stage)),
        };

        if stage == Stage::Deploy && options.selection.is_empty() {
            return Err(SubmissionError::EmptySelection);
        }

        if self
            .poller
            .tracked()
            .is_some_and(|tracked| tracked.targets(service.id, stage))
        {
            return Err(SubmissionError::AlreadyRunning {
                service_id: service.id,
                stage,
            });
        }

        let verdict = self.is_runnable(service, stage, &options.links);
        if !verdict.runnable {
            let reason = verdict.reason.unwrap_or_default();
            debug!("{} of {} not runnable: {}", stage, service.name, reason);
            return Err(SubmissionError::NotRunnable(reason));
        }

        let Some(infra) = options.infra.as_ref() else {
            return Err(SubmissionError::NotRunnable(REASON_INFRA_NOT_SET.to_string()));
        };

        self.set_pending(Some(PendingSubmission {
            service_id: service.id,
            stage,
        }));

        if options.confirm_gate {
            info!(
                "Security gate for {} of {} confirmed by user",
                stage, service.name
            );
        } else {
            match self.evaluate_gate(service, stage, &options.selection).await {
                GateDecision::Clear => {}
                GateDecision::Warn(warning) => {
                    info!(
                        "Security gate warns for {} of {}: {} ({})",
                        stage, service.name, warning.reason, warning.summary
                    );
                    return Err(SubmissionError::GateWarning(warning));
                }
                GateDecision::Blocked(reason) => {
                    self.set_pending(None);
                    return Err(SubmissionError::NotRunnable(reason));
                }
            }
        }

        let credentials = match self.resolver.resolve(service, stage, Some(infra)) {
            Resolution::Complete(credentials) => credentials,
            Resolution::Partial(partial) => {
                info!(
                    "{} of {} needs {} credential(s) before it can run",
                    stage,
                    service.name,
                    partial.missing.len()
                );
                return Err(SubmissionError::CredentialMissing(partial.missing));
            }
        };

        let result = match stage {
            Stage::Build => {
                let req = build_request(service, infra, credentials, &options);
                self.repository.submit_build(&req).await
            }
            _ => {
                let req = deploy_request(service, credentials, &options.selection);
                self.repository.submit_deploy(&req).await
            }
        };

        match result {
            Ok(()) => {
                info!("Submitted {} of {}", stage, service.name);
                self.set_pending(None);
                self.poller.add_service(service.id);
                self.poller.track(TrackedExecution {
                    service_id: service.id,
                    service_name: service.name.clone(),
                    step_name,
                    requested_stage: stage,
                });
                self.poller.start();
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                if is_credential_failure(&e) {
                    warn!(
                        "Backend rejected credentials for {} of {}: {}",
                        stage, service.name, message
                    );
                    Err(SubmissionError::CredentialInvalid(message))
                } else {
                    error!("Submission of {} for {} failed: {}", stage, service.name, message);
                    self.set_pending(None);
                    if self
                        .poller
                        .tracked()
                        .is_some_and(|tracked| tracked.service_id == service.id)
                    {
                        self.poller.clear_tracked();
                    }
                    Err(SubmissionError::Fatal(message))
                }
            }
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingSubmission>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_pending(&self, pending: Option<PendingSubmission>) {
        *self.lock_pending() = pending;
    }
}

fn build_request(
    service: &Service,
    infra: &Infrastructure,
    credentials: ExecutionCredentials,
    options: &SubmitOptions,
) -> BuildRequest {
    BuildRequest {
        service_id: service.id,
        ssh_hops: credentials.ssh_hops,
        infra_id: Some(infra.id),
        selected_services: options.selected_services.clone(),
        auto_deploy: Some(options.auto_deploy),
        git: credentials.git,
        registry: credentials.registry,
    }
}

fn deploy_request(
    service: &Service,
    credentials: ExecutionCredentials,
    selection: &ArtifactSelection,
) -> DeployRequest {
    let (image_tag, image_map) = match selection {
        ArtifactSelection::Image(tag) => (Some(tag.trim().to_string()), None),
        ArtifactSelection::PerService(map) => (
            None,
            Some(
                map.iter()
                    .map(|(name, tag)| (name.clone(), tag.trim().to_string()))
                    .collect(),
            ),
        ),
        ArtifactSelection::None => (None, None),
    };

    DeployRequest {
        service_id: service.id,
        ssh_hops: credentials.ssh_hops,
        image_tag,
        image_map,
        registry: credentials.registry,
    }
}
