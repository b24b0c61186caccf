//! Credential domain types
//!
//! Each credential class lives in its own keyed store and is updated
//! independently of the others.

use serde::{Deserialize, Serialize};

/// Git access token keyed by repository base URL (e.g. "https://git.example.com")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCredential {
    pub base_url: String,
    pub username: String,
    pub token: String,
}

/// SSH login for one host, keyed by (host, port)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredential {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Container registry login keyed by registry URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredential {
    pub registry_url: String,
    pub username: String,
    pub password: String,
}

/// Reduces a git remote to the base URL its credentials are keyed by
///
/// `https://git.example.com/org/repo.git` becomes `https://git.example.com`,
/// `git@git.example.com:org/repo.git` becomes `https://git.example.com`.
/// Returns `None` when the remote has no recognizable host.
pub fn git_base_url(remote: &str) -> Option<String> {
    let remote = remote.trim();

    if let Some((scheme, rest)) = remote.split_once("://") {
        let authority = rest.split('/').next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        if host.is_empty() {
            return None;
        }
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "ssh" | "git" => "https".to_string(),
            other => other.to_string(),
        };
        return Some(format!("{}://{}", scheme, host.to_ascii_lowercase()));
    }

    // scp-like syntax: user@host:path
    let (user_host, _path) = remote.split_once(':')?;
    let host = user_host.rsplit('@').next().unwrap_or_default();
    if host.is_empty() || host.contains('/') {
        return None;
    }
    Some(format!("https://{}", host.to_ascii_lowercase()))
}

/// Normalizes a stored or requested base URL for exact comparison
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}
