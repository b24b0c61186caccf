//! Controller error types
//!
//! Runnability and gate evaluation never fail; they return decisions. Only
//! submission talks to the backend on behalf of a caller, and every way it
//! can end short of success is one of these variants.

use keel_client::ClientError;
use keel_core::domain::service::Stage;
use thiserror::Error;

use crate::service::credentials::MissingCredential;
use crate::service::gate::GateWarning;

/// Why a submission did not reach the backend, or why the backend refused it
#[derive(Debug, Clone, Error)]
pub enum SubmissionError {
    /// Stage has no remote execution behind it
    #[error("Stage '{0}' cannot be submitted for execution")]
    UnsupportedStage(Stage),

    /// Deploy was requested without any image selected
    #[error("No image selected for deploy")]
    EmptySelection,

    /// The (service, stage) pair is already the tracked execution
    #[error("Pipeline already running for service {service_id} ({stage})")]
    AlreadyRunning { service_id: i64, stage: Stage },

    /// Stage is currently disabled
    #[error("Stage not runnable: {0}")]
    NotRunnable(String),

    /// Security gate needs explicit confirmation before resuming
    #[error("Security gate warning ({}): {}", .0.reason, .0.summary)]
    GateWarning(GateWarning),

    /// Credentials must be entered before execution can proceed
    #[error("Missing credentials: {}", describe_missing(.0))]
    CredentialMissing(Vec<MissingCredential>),

    /// Backend rejected the supplied credentials; retry with corrected input
    #[error("Credentials rejected: {0}")]
    CredentialInvalid(String),

    /// Terminal failure; in-flight state has been cleared
    #[error("Execution failed: {0}")]
    Fatal(String),
}

impl SubmissionError {
    /// Whether the caller can recover by prompting the user and retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::GateWarning(_) | Self::CredentialMissing(_) | Self::CredentialInvalid(_)
        )
    }

    /// Whether the credential-entry surface should be (re)opened
    pub fn needs_credentials(&self) -> bool {
        matches!(self, Self::CredentialMissing(_) | Self::CredentialInvalid(_))
    }
}

fn describe_missing(missing: &[MissingCredential]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Decides whether a failed submission was a credential rejection
///
/// A typed 401/403 from the backend client decides on its own; otherwise the
/// full error chain is matched against [`is_credential_error`].
pub fn is_credential_failure(err: &anyhow::Error) -> bool {
    if err
        .downcast_ref::<ClientError>()
        .is_some_and(ClientError::is_unauthorized)
    {
        return true;
    }
    is_credential_error(&format!("{:#}", err))
}

/// Decides whether a backend failure message points at bad credentials
///
/// Credential failures are recoverable by re-entering input; anything else
/// is treated as fatal.
pub fn is_credential_error(message: &str) -> bool {
    const MARKERS: &[&str] = &[
        "ssh",
        "authentication",
        "authenticate",
        "unauthorized",
        "token",
        "password",
        "credential",
        "permission denied",
        "forbidden",
    ];

    let message = message.to_ascii_lowercase();
    MARKERS.iter().any(|marker| message.contains(marker))
}
