//! Service domain types

use serde::{Deserialize, Serialize};

/// A registered source repository and its deployment settings
///
/// Created by the repository-registration flow and edited through settings.
/// The controller only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub git_remote_url: String,
    pub branch: String,
    #[serde(default)]
    pub infra_id: Option<i64>,
    #[serde(default)]
    pub registry_config: Option<RegistryConfig>,
    #[serde(default)]
    pub is_deployed: bool,
}

/// Container registry a service pushes its images to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub registry_url: String,
    #[serde(default)]
    pub project: Option<String>,
}

/// Link between a service and the infrastructure it deploys to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLink {
    pub service_id: i64,
    #[serde(default)]
    pub infra_id: Option<i64>,
}

/// A deployment target reachable through a chain of SSH hops
///
/// The inventory never carries usernames; those come from the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub id: i64,
    pub name: String,
    pub hops: Vec<HopTarget>,
}

/// One SSH-reachable host in a hop chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HopTarget {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
}

impl HopTarget {
    pub const DEFAULT_SSH_PORT: u16 = 22;

    /// Port with the SSH default applied
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(Self::DEFAULT_SSH_PORT)
    }
}

/// Lifecycle stage of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Source,
    Build,
    Deploy,
    Operate,
}

impl Stage {
    /// Pipeline step backing this stage, if the stage is executed remotely
    pub fn step(self) -> Option<StepName> {
        match self {
            Stage::Source => Some(StepName::Source),
            Stage::Build => Some(StepName::Build),
            Stage::Deploy => Some(StepName::Deploy),
            Stage::Operate => None,
        }
    }

    /// Whether a security gate runs before this stage
    pub fn is_gated(self) -> bool {
        matches!(self, Stage::Build | Stage::Deploy)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Source => write!(f, "source"),
            Stage::Build => write!(f, "build"),
            Stage::Deploy => write!(f, "deploy"),
            Stage::Operate => write!(f, "operate"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(Stage::Source),
            "build" => Ok(Stage::Build),
            "deploy" => Ok(Stage::Deploy),
            "operate" => Ok(Stage::Operate),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Name of a remotely executed pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Source,
    Build,
    Deploy,
}

impl StepName {
    pub const ALL: [StepName; 3] = [StepName::Source, StepName::Build, StepName::Deploy];
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepName::Source => write!(f, "source"),
            StepName::Build => write!(f, "build"),
            StepName::Deploy => write!(f, "deploy"),
        }
    }
}
