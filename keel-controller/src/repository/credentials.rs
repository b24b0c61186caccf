//! Credential repositories
//!
//! Three independent keyed stores: git tokens by base URL, SSH logins by
//! (host, port) and registry logins by registry URL. Each store owns its own
//! key semantics so a lookup can never return a credential filed under a
//! different key.
//!
//! The controller only reads; `upsert` exists for the credential-entry flow
//! that runs outside the controller.

use anyhow::{Context, Result};
use keel_core::domain::credentials::{
    GitCredential, RegistryCredential, ServerCredential, normalize_base_url,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Git credentials keyed by repository base URL
pub trait GitCredentialStore: Send + Sync {
    /// Exact match on the normalized base URL; no fallback
    fn find(&self, base_url: &str) -> Option<GitCredential>;
}

/// SSH credentials keyed by (host, port)
pub trait ServerCredentialStore: Send + Sync {
    /// Match on lowercased host and port
    fn find(&self, host: &str, port: u16) -> Option<ServerCredential>;
}

/// Registry credentials keyed by registry URL
pub trait RegistryCredentialStore: Send + Sync {
    /// Match where either URL contains the other
    fn find(&self, registry_url: &str) -> Option<RegistryCredential>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// In-memory git credential store
#[derive(Default)]
pub struct InMemoryGitCredentials {
    entries: RwLock<BTreeMap<String, GitCredential>>,
}

impl InMemoryGitCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the credential for its base URL
    pub fn upsert(&self, credential: GitCredential) {
        let key = normalize_base_url(&credential.base_url);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, credential);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GitCredentialStore for InMemoryGitCredentials {
    fn find(&self, base_url: &str) -> Option<GitCredential> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&normalize_base_url(base_url)).cloned()
    }
}

/// In-memory SSH credential store
#[derive(Default)]
pub struct InMemoryServerCredentials {
    entries: RwLock<BTreeMap<(String, u16), ServerCredential>>,
}

impl InMemoryServerCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the credential for its (host, port)
    pub fn upsert(&self, credential: ServerCredential) {
        let key = (credential.host.trim().to_lowercase(), credential.port);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, credential);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServerCredentialStore for InMemoryServerCredentials {
    fn find(&self, host: &str, port: u16) -> Option<ServerCredential> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(host.trim().to_lowercase(), port)).cloned()
    }
}

/// In-memory registry credential store
#[derive(Default)]
pub struct InMemoryRegistryCredentials {
    entries: RwLock<BTreeMap<String, RegistryCredential>>,
}

impl InMemoryRegistryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the credential for its registry URL
    pub fn upsert(&self, credential: RegistryCredential) {
        let key = credential.registry_url.trim().to_lowercase();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, credential);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegistryCredentialStore for InMemoryRegistryCredentials {
    fn find(&self, registry_url: &str) -> Option<RegistryCredential> {
        let wanted = registry_url.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(exact) = entries.get(&wanted) {
            return Some(exact.clone());
        }

        // Scheme/path variance: either side may be a prefix or suffix of the
        // other. The longest stored key wins so "registry.example.com/team"
        // beats "registry.example.com".
        entries
            .iter()
            .filter(|(stored, _)| {
                !stored.is_empty() && (stored.contains(&wanted) || wanted.contains(stored.as_str()))
            })
            .max_by_key(|(stored, _)| stored.len())
            .map(|(_, credential)| credential.clone())
    }
}

// =============================================================================
// Store bundle and file loading
// =============================================================================

/// Handles to the three credential stores, injected into the resolver
#[derive(Clone)]
pub struct CredentialStores {
    pub git: Arc<dyn GitCredentialStore>,
    pub servers: Arc<dyn ServerCredentialStore>,
    pub registries: Arc<dyn RegistryCredentialStore>,
}

impl CredentialStores {
    /// Stores with nothing in them
    pub fn empty() -> Self {
        Self {
            git: Arc::new(InMemoryGitCredentials::new()),
            servers: Arc::new(InMemoryServerCredentials::new()),
            registries: Arc::new(InMemoryRegistryCredentials::new()),
        }
    }
}

/// On-disk credential file
///
/// ```json
/// {
///   "git": [{ "base_url": "https://git.example.com", "username": "ci", "token": "..." }],
///   "servers": [{ "host": "10.0.0.5", "port": 22, "username": "deploy", "password": "..." }],
///   "registries": [{ "registry_url": "registry.example.com", "username": "ci", "password": "..." }]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(default)]
    pub git: Vec<GitCredential>,
    #[serde(default)]
    pub servers: Vec<ServerCredential>,
    #[serde(default)]
    pub registries: Vec<RegistryCredential>,
}

impl CredentialFile {
    /// Reads and parses a credential file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file {}", path.display()))?;
        let file: CredentialFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file {}", path.display()))?;

        info!(
            "Loaded {} git, {} server and {} registry credential(s)",
            file.git.len(),
            file.servers.len(),
            file.registries.len()
        );

        Ok(file)
    }

    /// Builds in-memory stores holding this file's entries
    pub fn into_stores(self) -> CredentialStores {
        let git = InMemoryGitCredentials::new();
        for credential in self.git {
            git.upsert(credential);
        }

        let servers = InMemoryServerCredentials::new();
        for credential in self.servers {
            servers.upsert(credential);
        }

        let registries = InMemoryRegistryCredentials::new();
        for credential in self.registries {
            registries.upsert(credential);
        }

        CredentialStores {
            git: Arc::new(git),
            servers: Arc::new(servers),
            registries: Arc::new(registries),
        }
    }
}
