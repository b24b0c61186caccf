//! Security scan domain model
//!
//! Scan engines run elsewhere; the controller only consumes their reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scan category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanCategory {
    /// Static analysis of the source tree, gates `build`
    Sast,

    /// Dependency/image analysis, gates `deploy`
    Sca,
}

impl ScanCategory {
    /// Path segment used by the backend API
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanCategory::Sast => "sast",
            ScanCategory::Sca => "sca",
        }
    }
}

impl std::fmt::Display for ScanCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanCategory::Sast => write!(f, "SAST"),
            ScanCategory::Sca => write!(f, "SCA"),
        }
    }
}

/// Finding counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveritySummary {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl SeveritySummary {
    pub fn add(&mut self, other: &SeveritySummary) {
        self.critical += other.critical;
        self.high += other.high;
        self.medium += other.medium;
        self.low += other.low;
    }

    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl std::fmt::Display for SeveritySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "critical={} high={} medium={} low={}",
            self.critical, self.high, self.medium, self.low
        )
    }
}

/// All stored scans of one category for a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResultEnvelope {
    pub service_id: i64,
    pub category: ScanCategory,
    #[serde(default)]
    pub scans: Vec<ArtifactScan>,
}

/// Scan of a single artifact (source commit or image tag)
///
/// `tools` maps each scanner (e.g. "semgrep", "codeql", "trivy") to its raw
/// report. Reports are heterogeneous and parsed by the gate evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactScan {
    pub artifact: String,
    #[serde(default)]
    pub tools: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub scanned_at: Option<DateTime<Utc>>,
}

impl ScanResultEnvelope {
    /// Most recent scan, by timestamp when present, otherwise by position
    pub fn newest(&self) -> Option<&ArtifactScan> {
        self.scans
            .iter()
            .enumerate()
            .max_by_key(|(idx, scan)| (scan.scanned_at, *idx))
            .map(|(_, scan)| scan)
    }

    /// Scan for an exact artifact, or an image reference ending in `:artifact`
    pub fn for_artifact(&self, artifact: &str) -> Option<&ArtifactScan> {
        let suffix = format!(":{}", artifact);
        self.scans
            .iter()
            .rev()
            .find(|scan| scan.artifact == artifact || scan.artifact.ends_with(&suffix))
    }

    /// Scan for one named image at `tag`
    ///
    /// Matches `image:tag` exactly or as the last path segment of a registry
    /// reference. A `tag` that is already a full reference must match exactly.
    pub fn for_image(&self, image: &str, tag: &str) -> Option<&ArtifactScan> {
        if tag.contains(':') || tag.contains('/') {
            return self.scans.iter().rev().find(|scan| scan.artifact == tag);
        }

        let reference = format!("{}:{}", image, tag);
        let nested = format!("/{}", reference);
        self.scans
            .iter()
            .rev()
            .find(|scan| scan.artifact == reference || scan.artifact.ends_with(&nested))
    }
}
