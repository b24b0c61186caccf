//! Credential resolver
//!
//! Merges git, SSH hop and registry credentials from their independent stores
//! into one execution payload. Resolution is a pure read: stores are never
//! written, and anything missing is enumerated rather than guessed.

use keel_core::domain::credentials::git_base_url;
use keel_core::domain::service::{Infrastructure, Service, Stage};
use keel_core::dto::execution::{GitAuth, RegistryAuth, SshHop};
use tracing::debug;

use crate::repository::CredentialStores;

/// Credential material for one execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionCredentials {
    pub git: Option<GitAuth>,
    /// Hops in chain order, first hop first
    pub ssh_hops: Vec<SshHop>,
    pub registry: Option<RegistryAuth>,
}

/// What could be resolved, plus everything that could not
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialCredentials {
    pub resolved: ExecutionCredentials,
    pub missing: Vec<MissingCredential>,
}

/// A required credential absent from its store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingCredential {
    Git { base_url: String },
    Server { host: String, port: u16 },
    Registry { registry_url: String },
    /// The stage needs a hop chain but no target infrastructure was given
    Infrastructure,
}

impl std::fmt::Display for MissingCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingCredential::Git { base_url } => write!(f, "git credential for {}", base_url),
            MissingCredential::Server { host, port } => {
                write!(f, "ssh credential for {}:{}", host, port)
            }
            MissingCredential::Registry { registry_url } => {
                write!(f, "registry credential for {}", registry_url)
            }
            MissingCredential::Infrastructure => write!(f, "target infrastructure for ssh hops"),
        }
    }
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Complete(ExecutionCredentials),
    Partial(PartialCredentials),
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        matches!(self, Resolution::Complete(_))
    }

    /// Missing credentials, empty when complete
    pub fn missing(&self) -> &[MissingCredential] {
        match self {
            Resolution::Complete(_) => &[],
            Resolution::Partial(partial) => &partial.missing,
        }
    }
}

/// Which credential classes a stage needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Requirements {
    git: bool,
    hops: bool,
    registry: bool,
}

impl Requirements {
    fn for_stage(stage: Stage, service: &Service) -> Self {
        let has_registry = service.registry_config.is_some();
        match stage {
            Stage::Source => Self {
                git: true,
                hops: false,
                registry: false,
            },
            Stage::Build => Self {
                git: true,
                hops: true,
                registry: has_registry,
            },
            Stage::Deploy => Self {
                git: false,
                hops: true,
                registry: has_registry,
            },
            Stage::Operate => Self {
                git: false,
                hops: true,
                registry: false,
            },
        }
    }
}

/// Resolves credentials for (service, stage) against injected stores
#[derive(Clone)]
pub struct CredentialResolver {
    stores: CredentialStores,
}

impl CredentialResolver {
    pub fn new(stores: CredentialStores) -> Self {
        Self { stores }
    }

    /// Stores this resolver reads from
    pub fn stores(&self) -> &CredentialStores {
        &self.stores
    }

    /// Resolves every credential `stage` needs for `service`
    ///
    /// # Arguments
    /// * `service` - Service being executed
    /// * `stage` - Requested stage
    /// * `infra` - Target infrastructure whose hop chain must be authenticated
    pub fn resolve(
        &self,
        service: &Service,
        stage: Stage,
        infra: Option<&Infrastructure>,
    ) -> Resolution {
        let requirements = Requirements::for_stage(stage, service);
        let mut resolved = ExecutionCredentials::default();
        let mut missing = Vec::new();

        if requirements.git {
            match self.resolve_git(service) {
                Ok(auth) => resolved.git = Some(auth),
                Err(m) => missing.push(m),
            }
        }

        if requirements.hops {
            if let Some(infra) = infra {
                for hop in &infra.hops {
                    let port = hop.effective_port();
                    let host = hop.host.trim().to_lowercase();
                    match self.stores.servers.find(&host, port) {
                        // Username always comes from the store, never the inventory
                        Some(credential) => resolved.ssh_hops.push(SshHop {
                            host: hop.host.clone(),
                            port,
                            username: credential.username,
                            password: credential.password,
                        }),
                        None => missing.push(MissingCredential::Server { host, port }),
                    }
                }
            } else {
                debug!("{} of {} needs ssh hops but has no infrastructure", stage, service.name);
                missing.push(MissingCredential::Infrastructure);
            }
        }

        if requirements.registry {
            if let Some(config) = &service.registry_config {
                match self.stores.registries.find(&config.registry_url) {
                    Some(credential) => {
                        resolved.registry = Some(RegistryAuth {
                            registry_url: config.registry_url.clone(),
                            username: credential.username,
                            password: credential.password,
                        })
                    }
                    None => missing.push(MissingCredential::Registry {
                        registry_url: config.registry_url.clone(),
                    }),
                }
            }
        }

        if missing.is_empty() {
            Resolution::Complete(resolved)
        } else {
            debug!(
                "Credential resolution for service {} ({}) is missing {} item(s)",
                service.id,
                stage,
                missing.len()
            );
            Resolution::Partial(PartialCredentials { resolved, missing })
        }
    }

    fn resolve_git(&self, service: &Service) -> Result<GitAuth, MissingCredential> {
        let base_url = git_base_url(&service.git_remote_url).ok_or_else(|| {
            MissingCredential::Git {
                base_url: service.git_remote_url.clone(),
            }
        })?;

        self.stores
            .git
            .find(&base_url)
            .map(|credential| GitAuth {
                username: credential.username,
                token: credential.token,
            })
            .ok_or(MissingCredential::Git { base_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        InMemoryGitCredentials, InMemoryRegistryCredentials, InMemoryServerCredentials,
    };
    use keel_core::domain::credentials::{GitCredential, RegistryCredential, ServerCredential};
    use keel_core::domain::service::{HopTarget, RegistryConfig};
    use std::sync::Arc;

    fn service(remote: &str) -> Service {
        Service {
            id: 1,
            name: "api".to_string(),
            git_remote_url: remote.to_string(),
            branch: "main".to_string(),
            infra_id: Some(9),
            registry_config: None,
            is_deployed: false,
        }
    }

    fn infra(hops: &[(&str, Option<u16>)]) -> Infrastructure {
        Infrastructure {
            id: 9,
            name: "prod".to_string(),
            hops: hops
                .iter()
                .map(|(host, port)| HopTarget {
                    host: host.to_string(),
                    port: *port,
                })
                .collect(),
        }
    }

    fn stores() -> CredentialStores {
        let git = InMemoryGitCredentials::new();
        git.upsert(GitCredential {
            base_url: "https://git.example.com".to_string(),
            username: "ci".to_string(),
            token: "secret-token".to_string(),
        });

        let servers = InMemoryServerCredentials::new();
        servers.upsert(ServerCredential {
            host: "bastion.example.com".to_string(),
            port: 22,
            username: "jump".to_string(),
            password: "jump-pw".to_string(),
        });
        servers.upsert(ServerCredential {
            host: "10.0.0.5".to_string(),
            port: 2222,
            username: "deploy".to_string(),
            password: "deploy-pw".to_string(),
        });

        let registries = InMemoryRegistryCredentials::new();
        registries.upsert(RegistryCredential {
            registry_url: "registry.example.com".to_string(),
            username: "robot".to_string(),
            password: "robot-pw".to_string(),
        });

        CredentialStores {
            git: Arc::new(git),
            servers: Arc::new(servers),
            registries: Arc::new(registries),
        }
    }

    #[test]
    fn test_source_resolves_git_only() {
        let resolver = CredentialResolver::new(stores());
        let result = resolver.resolve(
            &service("https://git.example.com/org/api.git"),
            Stage::Source,
            None,
        );

        let Resolution::Complete(creds) = result else {
            panic!("expected complete resolution");
        };
        assert_eq!(creds.git.map(|g| g.token), Some("secret-token".to_string()));
        assert!(creds.ssh_hops.is_empty());
        assert!(creds.registry.is_none());
    }

    #[test]
    fn test_git_never_resolves_for_other_base_url() {
        let resolver = CredentialResolver::new(stores());
        let result = resolver.resolve(
            &service("https://other.example.com/org/api.git"),
            Stage::Source,
            None,
        );

        assert_eq!(
            result.missing(),
            &[MissingCredential::Git {
                base_url: "https://other.example.com".to_string()
            }]
        );
    }

    #[test]
    fn test_build_resolves_hop_chain_in_order() {
        let resolver = CredentialResolver::new(stores());
        let target = infra(&[("Bastion.Example.com", None), ("10.0.0.5", Some(2222))]);

        let result = resolver.resolve(
            &service("git@git.example.com:org/api.git"),
            Stage::Build,
            Some(&target),
        );

        let Resolution::Complete(creds) = result else {
            panic!("expected complete resolution");
        };
        assert_eq!(creds.ssh_hops.len(), 2);
        assert_eq!(creds.ssh_hops[0].username, "jump");
        assert_eq!(creds.ssh_hops[0].port, 22);
        assert_eq!(creds.ssh_hops[1].username, "deploy");
        assert_eq!(creds.ssh_hops[1].port, 2222);
    }

    #[test]
    fn test_partial_enumerates_every_missing_class() {
        let resolver = CredentialResolver::new(stores());
        let mut svc = service("https://nowhere.example.com/org/api.git");
        svc.registry_config = Some(RegistryConfig {
            registry_url: "ghcr.io".to_string(),
            project: None,
        });
        let target = infra(&[("bastion.example.com", None), ("10.0.0.6", None)]);

        let Resolution::Partial(partial) = resolver.resolve(&svc, Stage::Build, Some(&target))
        else {
            panic!("expected partial resolution");
        };

        assert_eq!(
            partial.missing,
            vec![
                MissingCredential::Git {
                    base_url: "https://nowhere.example.com".to_string()
                },
                MissingCredential::Server {
                    host: "10.0.0.6".to_string(),
                    port: 22
                },
                MissingCredential::Registry {
                    registry_url: "ghcr.io".to_string()
                },
            ]
        );
        // The hop that did resolve is still reported
        assert_eq!(partial.resolved.ssh_hops.len(), 1);
    }

    #[test]
    fn test_deploy_resolves_registry_by_containment() {
        let resolver = CredentialResolver::new(stores());
        let mut svc = service("https://git.example.com/org/api.git");
        svc.registry_config = Some(RegistryConfig {
            registry_url: "https://registry.example.com/team".to_string(),
            project: Some("team".to_string()),
        });
        let target = infra(&[("bastion.example.com", None)]);

        let Resolution::Complete(creds) = resolver.resolve(&svc, Stage::Deploy, Some(&target))
        else {
            panic!("expected complete resolution");
        };
        assert!(creds.git.is_none());
        assert_eq!(creds.registry.map(|r| r.username), Some("robot".to_string()));
    }

    #[test]
    fn test_resolution_does_not_touch_stores() {
        let stores = stores();
        let resolver = CredentialResolver::new(stores.clone());
        let svc = service("https://git.example.com/org/api.git");

        let first = resolver.resolve(&svc, Stage::Source, None);
        let second = resolver.resolve(&svc, Stage::Source, None);

        assert_eq!(first, second);
        assert!(stores.git.find("https://git.example.com").is_some());
    }

    #[test]
    fn test_hop_stage_without_infrastructure_is_partial() {
        let resolver = CredentialResolver::new(stores());
        let svc = service("https://git.example.com/org/api.git");

        for stage in [Stage::Build, Stage::Deploy, Stage::Operate] {
            let result = resolver.resolve(&svc, stage, None);
            assert!(!result.is_complete(), "{} resolved without hops", stage);
            assert_eq!(result.missing(), &[MissingCredential::Infrastructure]);
        }
    }
}
