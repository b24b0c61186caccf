//! Service layer
//!
//! Services hold the controller's decision logic. Evaluators are pure and
//! synchronous; only submission performs I/O, through the repository traits.
//!
//! Flow for a user action on (service, stage):
//! runnability -> security gate -> credential resolution -> submission,
//! after which the poller watches the tracked execution to completion.

pub mod credentials;
pub mod gate;
pub mod runnability;
pub mod submission;

// Re-export main types
pub use credentials::{
    CredentialResolver, ExecutionCredentials, MissingCredential, PartialCredentials, Resolution,
};
pub use gate::{ArtifactSelection, GateDecision, GateWarning, SelectedArtifact, WarnReason};
pub use runnability::{Runnability, RunnabilityInput, is_runnable};
pub use submission::{ExecutionController, PendingSubmission, SubmitOptions};
