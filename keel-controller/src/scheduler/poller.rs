//! Pipeline status poller
//!
//! One batched status fetch per tick for every known service. The loop keeps
//! running while any step is running, then for a grace period of
//! `grace_ticks` more ticks to absorb backend write-lag, then stops itself.
//!
//! Each tick's fetch runs in its own task, so a hung request delays only its
//! own result. Responses are stamped with the loop generation and tick
//! number; anything from a superseded generation, or older than what was
//! already applied, is discarded.

use anyhow::Result;
use chrono::{DateTime, Utc};
use keel_core::domain::pipeline::{
    FinishedExecution, PipelineStep, StepStatus, TrackedExecution, latest_step,
};
use keel_core::domain::service::StepName;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::repository::PipelineRepository;

/// Single-slot completion callback, consumed when it fires
pub type FinishedCallback = Box<dyn FnOnce(FinishedExecution) + Send + 'static>;

/// Lifecycle of a polling session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollerPhase {
    #[default]
    Idle,
    /// Something is running
    Polling,
    /// Nothing is running; counting down the grace ticks
    GracePeriod,
}

/// Poll cadence
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub grace_ticks: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Config::DEFAULT_POLL_INTERVAL,
            grace_ticks: Config::DEFAULT_GRACE_TICKS,
        }
    }
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            grace_ticks: config.grace_ticks,
        }
    }
}

/// Status poller handle; clones share the same loop and state
#[derive(Clone)]
pub struct PipelinePoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    repository: Arc<dyn PipelineRepository>,
    settings: PollSettings,
    state: Mutex<PollerState>,
}

#[derive(Default)]
struct PollerState {
    generation: u64,
    task: Option<JoinHandle<()>>,
    phase: PollerPhase,
    grace_count: u32,
    next_tick: u64,
    last_applied_tick: u64,
    fetch_count: u64,
    service_ids: BTreeSet<i64>,
    steps: HashMap<i64, Vec<PipelineStep>>,
    tracked: Option<TrackedState>,
    on_finished: Option<FinishedCallback>,
    last_error: Option<String>,
    last_polled_at: Option<DateTime<Utc>>,
}

/// Tracked execution plus what is needed to tell its result from an older run's
struct TrackedState {
    execution: TrackedExecution,
    baseline: Baseline,
    registered_at: DateTime<Utc>,
    /// The step was observed pending or running after tracking began
    seen_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Baseline {
    /// Latest record id for the step when tracking began (`None`: no record)
    Known(Option<i64>),
    /// No snapshot of this service had been fetched yet
    Unknown,
}

impl PipelinePoller {
    /// Creates an idle poller
    pub fn new(repository: Arc<dyn PipelineRepository>, settings: PollSettings) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                repository,
                settings,
                state: Mutex::new(PollerState::default()),
            }),
        }
    }

    /// Replaces the set of services covered by each batched fetch
    pub fn set_services(&self, service_ids: impl IntoIterator<Item = i64>) {
        let mut state = self.inner.lock();
        state.service_ids = service_ids.into_iter().collect();
    }

    /// Adds one service to the batch
    pub fn add_service(&self, service_id: i64) {
        self.inner.lock().service_ids.insert(service_id);
    }

    /// Starts (or restarts) the polling loop
    ///
    /// Any existing loop is cancelled first, so there is never more than one.
    /// The first fetch happens immediately. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) {
        let mut state = self.inner.lock();

        if let Some(task) = state.task.take() {
            debug!("Cancelling previous poll loop");
            task.abort();
        }

        state.generation += 1;
        state.grace_count = 0;
        state.last_error = None;
        state.phase = PollerPhase::Polling;

        let generation = state.generation;
        info!(
            "Starting pipeline poller (generation {}, interval {:?}, {} service(s))",
            generation,
            self.inner.settings.interval,
            state.service_ids.len()
        );

        let inner = Arc::clone(&self.inner);
        state.task = Some(tokio::spawn(PollerInner::run(inner, generation)));
    }

    /// Stops the loop; a no-op when already idle
    ///
    /// In-flight fetches are not cancelled; their responses are discarded
    /// when they arrive.
    pub fn stop(&self) {
        let mut state = self.inner.lock();
        if state.phase == PollerPhase::Idle && state.task.is_none() {
            return;
        }
        info!("Stopping pipeline poller");
        state.halt();
    }

    /// Registers the single tracked execution
    ///
    /// A different execution already being tracked is replaced.
    pub fn track(&self, execution: TrackedExecution) {
        let mut state = self.inner.lock();

        let baseline = if state.last_polled_at.is_some()
            && state.service_ids.contains(&execution.service_id)
        {
            Baseline::Known(
                state
                    .steps
                    .get(&execution.service_id)
                    .and_then(|steps| latest_step(steps, execution.step_name))
                    .map(|step| step.id),
            )
        } else {
            Baseline::Unknown
        };

        if let Some(previous) = &state.tracked {
            if previous.execution != execution {
                warn!(
                    "Replacing tracked execution {} ({}) with {} ({})",
                    previous.execution.service_name,
                    previous.execution.requested_stage,
                    execution.service_name,
                    execution.requested_stage
                );
            }
        }

        debug!(
            "Tracking {} of service {} (baseline {:?})",
            execution.step_name, execution.service_id, baseline
        );
        state.service_ids.insert(execution.service_id);
        state.tracked = Some(TrackedState {
            execution,
            baseline,
            registered_at: Utc::now(),
            seen_active: false,
        });
    }

    /// Forgets the tracked execution without signalling completion
    pub fn clear_tracked(&self) -> Option<TrackedExecution> {
        self.inner.lock().tracked.take().map(|t| t.execution)
    }

    /// Sets the callback fired once when the tracked execution finishes
    pub fn on_execution_finished(
        &self,
        callback: impl FnOnce(FinishedExecution) + Send + 'static,
    ) {
        self.inner.lock().on_finished = Some(Box::new(callback));
    }

    // =============================================================================
    // Read accessors
    // =============================================================================

    pub fn phase(&self) -> PollerPhase {
        self.inner.lock().phase
    }

    pub fn is_polling(&self) -> bool {
        self.phase() != PollerPhase::Idle
    }

    pub fn tracked(&self) -> Option<TrackedExecution> {
        self.inner.lock().tracked.as_ref().map(|t| t.execution.clone())
    }

    /// All steps last reported for a service
    pub fn steps_for(&self, service_id: i64) -> Vec<PipelineStep> {
        self.inner
            .lock()
            .steps
            .get(&service_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Latest record of one step of a service
    pub fn latest_step(&self, service_id: i64, step_name: StepName) -> Option<PipelineStep> {
        let state = self.inner.lock();
        state
            .steps
            .get(&service_id)
            .and_then(|steps| latest_step(steps, step_name))
            .cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    pub fn grace_count(&self) -> u32 {
        self.inner.lock().grace_count
    }

    pub fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_polled_at
    }

    /// Status fetches issued since creation
    pub fn fetch_count(&self) -> u64 {
        self.inner.lock().fetch_count
    }
}

impl PollerInner {
    fn lock(&self) -> MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Timer loop of one generation
    async fn run(inner: Arc<PollerInner>, generation: u64) {
        let mut ticker = time::interval(inner.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some((tick, service_ids)) = inner.begin_tick(generation) else {
                debug!("Poll loop generation {} finished", generation);
                break;
            };

            let worker = Arc::clone(&inner);
            tokio::spawn(async move {
                let result = if service_ids.is_empty() {
                    Ok(HashMap::new())
                } else {
                    worker.repository.fetch_pipeline_statuses(&service_ids).await
                };
                worker.apply(generation, tick, result);
            });
        }
    }

    /// Claims the next tick number, or `None` if this generation is over
    fn begin_tick(&self, generation: u64) -> Option<(u64, Vec<i64>)> {
        let mut state = self.lock();
        if state.generation != generation || state.phase == PollerPhase::Idle {
            return None;
        }

        state.next_tick += 1;
        let service_ids: Vec<i64> = state.service_ids.iter().copied().collect();
        if !service_ids.is_empty() {
            state.fetch_count += 1;
        }

        debug!(
            "Poll tick {} for {} service(s)",
            state.next_tick,
            service_ids.len()
        );
        Some((state.next_tick, service_ids))
    }

    /// Applies one tick's fetch result
    fn apply(&self, generation: u64, tick: u64, result: Result<HashMap<i64, Vec<PipelineStep>>>) {
        let mut state = self.lock();

        if state.generation != generation || state.phase == PollerPhase::Idle {
            debug!(
                "Discarding status response from superseded poll generation {}",
                generation
            );
            return;
        }
        if tick <= state.last_applied_tick {
            debug!(
                "Discarding out-of-order status response for tick {} (applied {})",
                tick, state.last_applied_tick
            );
            return;
        }
        state.last_applied_tick = tick;

        let steps = match result {
            Ok(steps) => steps,
            Err(e) => {
                error!("Status poll failed, stopping poller: {:#}", e);
                state.last_error = Some(format!("{:#}", e));
                state.halt();
                return;
            }
        };

        state.steps = steps;
        state.last_polled_at = Some(Utc::now());

        let finished = state.check_tracked();
        let callback = if finished.is_some() {
            state.on_finished.take()
        } else {
            None
        };

        if state.any_running() {
            state.grace_count = 0;
            state.phase = PollerPhase::Polling;
        } else if state.grace_count >= self.settings.grace_ticks {
            info!(
                "Nothing running for {} tick(s), stopping poller",
                state.grace_count
            );
            if let Some(abandoned) = state.tracked.take() {
                warn!(
                    "Tracked {} of {} never reported completion; releasing it",
                    abandoned.execution.requested_stage, abandoned.execution.service_name
                );
            }
            state.halt();
        } else {
            state.grace_count += 1;
            state.phase = PollerPhase::GracePeriod;
        }

        drop(state);

        if let Some(finished) = finished {
            info!(
                "Pipeline {} of {} finished: {}",
                finished.stage,
                finished.service_name,
                if finished.success { "success" } else { "failure" }
            );
            if let Some(callback) = callback {
                callback(finished);
            }
        }
    }
}

impl PollerState {
    /// Cancels the loop and invalidates in-flight responses
    fn halt(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        self.grace_count = 0;
        self.phase = PollerPhase::Idle;
    }

    /// Whether the latest record of any step of any service is running
    fn any_running(&self) -> bool {
        self.steps.values().any(|steps| {
            StepName::ALL.iter().any(|name| {
                latest_step(steps, *name).is_some_and(|step| step.status == StepStatus::Running)
            })
        })
    }

    /// Retires the tracked execution if its step reached a terminal state
    fn check_tracked(&mut self) -> Option<FinishedExecution> {
        let tracked = self.tracked.as_mut()?;
        let latest = self
            .steps
            .get(&tracked.execution.service_id)
            .and_then(|steps| latest_step(steps, tracked.execution.step_name))?;

        if !latest.status.is_terminal() {
            tracked.seen_active = true;
            return None;
        }

        // A terminal record only counts if it belongs to this execution,
        // not to the run that preceded it.
        let fresh = tracked.seen_active
            || match tracked.baseline {
                Baseline::Known(baseline) => baseline.is_none_or(|id| latest.id > id),
                Baseline::Unknown => latest
                    .completed_at
                    .is_some_and(|completed| completed >= tracked.registered_at),
            };
        if !fresh {
            // First look at this step since tracking: the record is the previous run
            if tracked.baseline == Baseline::Unknown {
                debug!(
                    "Baseline for {} of service {} is record {}",
                    tracked.execution.step_name, tracked.execution.service_id, latest.id
                );
                tracked.baseline = Baseline::Known(Some(latest.id));
            }
            return None;
        }

        let finished = FinishedExecution {
            service_id: tracked.execution.service_id,
            service_name: tracked.execution.service_name.clone(),
            stage: tracked.execution.requested_stage,
            success: latest.status == StepStatus::Success,
            error_message: latest.error_message.clone(),
        };
        self.tracked = None;
        Some(finished)
    }
}
