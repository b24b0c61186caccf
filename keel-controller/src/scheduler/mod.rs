//! Scheduler layer
//!
//! Polls the backend for pipeline statuses on a timer, keeps the latest
//! normalized snapshot, and retires the tracked execution when it finishes.

pub mod poller;

pub use poller::{FinishedCallback, PipelinePoller, PollSettings, PollerPhase};
