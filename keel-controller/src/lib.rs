//! Keel Controller
//!
//! Client-resident pipeline execution and security-gate controller.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Repositories: credential stores and the pipeline backend behind traits
//! - Services: credential resolution, security gates, stage runnability,
//!   execution submission
//! - Scheduler: adaptive status polling and tracked-execution completion
//!
//! The controller never runs pipeline steps itself. It asks the backend to
//! execute them and interprets the state the backend reports back.

pub mod config;
pub mod error;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::SubmissionError;
pub use repository::{CredentialFile, CredentialStores, HttpPipelineRepository, PipelineRepository};
pub use scheduler::{PipelinePoller, PollSettings, PollerPhase};
pub use service::{
    ArtifactSelection, CredentialResolver, ExecutionController, GateDecision, GateWarning,
    MissingCredential, PendingSubmission, Resolution, Runnability, SelectedArtifact, SubmitOptions,
    WarnReason,
};
