//! Stage runnability evaluator
//!
//! Pure, synchronous decision of whether a stage button should be enabled.
//!
//! Precondition: `links` must be the freshest service-link list the caller
//! has. The evaluator never re-fetches it.
//!
//! Missing SSH hop credentials do not disable build/deploy/operate. They are
//! requested at submission time instead, so a partially configured service
//! stays actionable through the in-flow credential prompt.

use keel_core::domain::credentials::git_base_url;
use keel_core::domain::pipeline::TrackedExecution;
use keel_core::domain::service::{Service, ServiceLink, Stage};

use crate::repository::GitCredentialStore;

pub const REASON_INFRA_NOT_SET: &str = "infrastructure not set";
pub const REASON_GIT_CREDENTIAL_MISSING: &str = "git credential not registered";
pub const REASON_ALREADY_RUNNING: &str = "pipeline already running";

/// Everything the evaluator looks at
pub struct RunnabilityInput<'a> {
    pub service: &'a Service,
    pub stage: Stage,
    pub links: &'a [ServiceLink],
    pub git_credentials: &'a dyn GitCredentialStore,
    pub tracked: Option<&'a TrackedExecution>,
}

/// Runnability verdict consumed by button-disable logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runnability {
    pub runnable: bool,
    pub disabled: bool,
    pub reason: Option<String>,
}

impl Runnability {
    fn runnable() -> Self {
        Self {
            runnable: true,
            disabled: false,
            reason: None,
        }
    }

    fn disabled(reason: &str) -> Self {
        Self {
            runnable: false,
            disabled: true,
            reason: Some(reason.to_string()),
        }
    }
}

/// Infrastructure assigned to a service: the link wins, the settings value is the fallback
pub fn assigned_infra(service: &Service, links: &[ServiceLink]) -> Option<i64> {
    links
        .iter()
        .find(|link| link.service_id == service.id)
        .and_then(|link| link.infra_id)
        .or(service.infra_id)
}

/// Decides whether `input.stage` can run for `input.service` right now
pub fn is_runnable(input: &RunnabilityInput<'_>) -> Runnability {
    let RunnabilityInput {
        service,
        stage,
        links,
        git_credentials,
        tracked,
    } = *input;

    if tracked.is_some_and(|t| t.targets(service.id, stage)) {
        return Runnability::disabled(REASON_ALREADY_RUNNING);
    }

    if stage != Stage::Source && assigned_infra(service, links).is_none() {
        return Runnability::disabled(REASON_INFRA_NOT_SET);
    }

    let has_git = git_base_url(&service.git_remote_url)
        .and_then(|base_url| git_credentials.find(&base_url))
        .is_some();
    if !has_git {
        return Runnability::disabled(REASON_GIT_CREDENTIAL_MISSING);
    }

    Runnability::runnable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryGitCredentials;
    use keel_core::domain::credentials::GitCredential;
    use keel_core::domain::service::StepName;

    fn service(infra_id: Option<i64>) -> Service {
        Service {
            id: 5,
            name: "billing".to_string(),
            git_remote_url: "https://git.example.com/org/billing.git".to_string(),
            branch: "main".to_string(),
            infra_id,
            registry_config: None,
            is_deployed: false,
        }
    }

    fn git_store() -> InMemoryGitCredentials {
        let store = InMemoryGitCredentials::new();
        store.upsert(GitCredential {
            base_url: "https://git.example.com".to_string(),
            username: "ci".to_string(),
            token: "t".to_string(),
        });
        store
    }

    #[test]
    fn test_missing_infra_disables_build() {
        let store = git_store();
        let svc = service(None);
        let verdict = is_runnable(&RunnabilityInput {
            service: &svc,
            stage: Stage::Build,
            links: &[],
            git_credentials: &store,
            tracked: None,
        });

        assert_eq!(
            verdict,
            Runnability {
                runnable: false,
                disabled: true,
                reason: Some("infrastructure not set".to_string()),
            }
        );
    }

    #[test]
    fn test_source_needs_only_git() {
        let store = git_store();
        let svc = service(None);
        let input = RunnabilityInput {
            service: &svc,
            stage: Stage::Source,
            links: &[],
            git_credentials: &store,
            tracked: None,
        };
        assert!(is_runnable(&input).runnable);

        let empty = InMemoryGitCredentials::new();
        let input = RunnabilityInput {
            git_credentials: &empty,
            ..input
        };
        let verdict = is_runnable(&input);
        assert!(verdict.disabled);
        assert_eq!(verdict.reason.as_deref(), Some(REASON_GIT_CREDENTIAL_MISSING));
    }

    #[test]
    fn test_link_supplies_infra() {
        let store = git_store();
        let svc = service(None);
        let links = [ServiceLink {
            service_id: 5,
            infra_id: Some(3),
        }];

        for stage in [Stage::Build, Stage::Deploy, Stage::Operate] {
            let verdict = is_runnable(&RunnabilityInput {
                service: &svc,
                stage,
                links: &links,
                git_credentials: &store,
                tracked: None,
            });
            assert!(verdict.runnable, "{} should be runnable", stage);
        }
    }

    #[test]
    fn test_tracked_execution_rejects_same_pair_only() {
        let store = git_store();
        let svc = service(Some(3));
        let tracked = TrackedExecution {
            service_id: 5,
            service_name: "billing".to_string(),
            step_name: StepName::Build,
            requested_stage: Stage::Build,
        };

        let build = is_runnable(&RunnabilityInput {
            service: &svc,
            stage: Stage::Build,
            links: &[],
            git_credentials: &store,
            tracked: Some(&tracked),
        });
        assert_eq!(build.reason.as_deref(), Some(REASON_ALREADY_RUNNING));

        let deploy = is_runnable(&RunnabilityInput {
            service: &svc,
            stage: Stage::Deploy,
            links: &[],
            git_credentials: &store,
            tracked: Some(&tracked),
        });
        assert!(deploy.runnable);
    }

    #[test]
    fn test_same_inputs_same_verdict() {
        let store = git_store();
        let svc = service(Some(3));
        let input = RunnabilityInput {
            service: &svc,
            stage: Stage::Deploy,
            links: &[],
            git_credentials: &store,
            tracked: None,
        };
        assert_eq!(is_runnable(&input), is_runnable(&input));
    }
}
