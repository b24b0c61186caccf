//! Execution request DTOs
//!
//! Payloads for remote build and deploy submissions, carrying the resolved
//! credential material.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One resolved SSH hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshHop {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Git access for cloning the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitAuth {
    pub username: String,
    pub token: String,
}

/// Registry access for pushing or pulling images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    pub registry_url: String,
    pub username: String,
    pub password: String,
}

/// Request to start a remote build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub service_id: i64,
    pub ssh_hops: Vec<SshHop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infra_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_services: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_deploy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryAuth>,
}

/// Request to start a remote deploy
///
/// Either `image_tag` (single image) or `image_map` (subservice -> tag) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub service_id: i64,
    pub ssh_hops: Vec<SshHop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_map: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryAuth>,
}
