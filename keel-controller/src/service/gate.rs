//! Security gate evaluator
//!
//! SAST results gate `build`, SCA results gate `deploy`. The evaluator never
//! blocks on its own: it returns `Warn` or `Clear`, and proceeding past a
//! warning is an explicit user decision captured by the caller.
//!
//! Reports are heterogeneous. Per finding, severity is taken from the first
//! source that yields one:
//! 1. rule level (`rule.level`, `level`, or the rule descriptor's default level)
//! 2. properties (`severity`, or a numeric `security-severity` score)
//! 3. tags naming a severity
//!
//! Findings without any signal count as low. Pre-aggregated summaries and
//! vulnerability lists (`Results[].Vulnerabilities[].Severity`) are accepted too.

use keel_core::domain::scan::{ArtifactScan, ScanCategory, ScanResultEnvelope, SeveritySummary};
use keel_core::domain::service::Stage;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Why a gate warned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnReason {
    /// At least one relevant artifact was never scanned
    NoAnalysis,
    /// Scans exist and report critical findings
    CriticalFound,
}

impl WarnReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarnReason::NoAnalysis => "no_analysis",
            WarnReason::CriticalFound => "critical_found",
        }
    }
}

impl std::fmt::Display for WarnReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details attached to a gate warning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateWarning {
    pub reason: WarnReason,
    /// Counts summed over every analyzed artifact with critical findings
    pub summary: SeveritySummary,
    /// Artifacts without any scan
    pub unanalyzed: Vec<String>,
}

/// Outcome of a gate check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Hard stop; reserved for policies outside this evaluator
    Blocked(String),
    /// Proceed only after explicit confirmation
    Warn(GateWarning),
    Clear,
}

impl GateDecision {
    pub fn is_clear(&self) -> bool {
        matches!(self, GateDecision::Clear)
    }
}

/// Artifacts chosen for a deploy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ArtifactSelection {
    #[default]
    None,
    /// One image tag for the whole service
    Image(String),
    /// Subservice name -> image tag
    PerService(BTreeMap<String, String>),
}

impl ArtifactSelection {
    /// Whether nothing usable was selected
    pub fn is_empty(&self) -> bool {
        match self {
            ArtifactSelection::None => true,
            ArtifactSelection::Image(tag) => tag.trim().is_empty(),
            ArtifactSelection::PerService(map) => {
                map.is_empty() || map.values().any(|tag| tag.trim().is_empty())
            }
        }
    }

    /// Selected artifacts, in subservice order, without blanks
    ///
    /// Each subservice keeps its own entry even when tags repeat; only
    /// identical references collapse.
    pub fn artifacts(&self) -> Vec<SelectedArtifact> {
        let selected: Vec<SelectedArtifact> = match self {
            ArtifactSelection::None => Vec::new(),
            ArtifactSelection::Image(tag) => vec![SelectedArtifact::bare(tag.trim())],
            ArtifactSelection::PerService(map) => map
                .iter()
                .map(|(name, tag)| SelectedArtifact::image(name.trim(), tag.trim()))
                .collect(),
        };

        let mut artifacts: Vec<SelectedArtifact> = Vec::new();
        for artifact in selected {
            if !artifact.tag.is_empty() && !artifacts.contains(&artifact) {
                artifacts.push(artifact);
            }
        }
        artifacts
    }
}

/// One artifact whose scan must be checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedArtifact {
    /// Image name of the subservice, `None` for a service-wide tag or commit
    pub image: Option<String>,
    pub tag: String,
}

impl SelectedArtifact {
    pub fn bare(tag: impl Into<String>) -> Self {
        Self {
            image: None,
            tag: tag.into(),
        }
    }

    pub fn image(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            tag: tag.into(),
        }
    }

    fn lookup<'a>(&self, envelope: &'a ScanResultEnvelope) -> Option<&'a ArtifactScan> {
        match &self.image {
            Some(image) => envelope.for_image(image, &self.tag),
            None => envelope.for_artifact(&self.tag),
        }
    }
}

impl std::fmt::Display for SelectedArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.image {
            Some(image) if !self.tag.contains(':') && !self.tag.contains('/') => {
                write!(f, "{}:{}", image, self.tag)
            }
            _ => write!(f, "{}", self.tag),
        }
    }
}

/// Scan category gating a stage, if any
pub fn category_for(stage: Stage) -> Option<ScanCategory> {
    match stage {
        Stage::Build => Some(ScanCategory::Sast),
        Stage::Deploy => Some(ScanCategory::Sca),
        Stage::Source | Stage::Operate => None,
    }
}

/// Evaluates a gate from an already fetched scan result
///
/// # Arguments
/// * `category` - Scan category being checked
/// * `stage` - Stage the gate guards
/// * `scan_result` - Stored scans, `None` when the service was never scanned
/// * `artifacts` - Artifacts to check individually; empty means "newest scan"
pub fn evaluate(
    category: ScanCategory,
    stage: Stage,
    scan_result: Option<&ScanResultEnvelope>,
    artifacts: &[SelectedArtifact],
) -> GateDecision {
    let Some(envelope) = scan_result else {
        debug!("No {} result for {} gate", category, stage);
        let unanalyzed = if artifacts.is_empty() {
            vec!["latest".to_string()]
        } else {
            artifacts.iter().map(ToString::to_string).collect()
        };
        return GateDecision::Warn(GateWarning {
            reason: WarnReason::NoAnalysis,
            summary: SeveritySummary::default(),
            unanalyzed,
        });
    };

    let checks: Vec<(String, Option<&ArtifactScan>)> = if artifacts.is_empty() {
        vec![("latest".to_string(), envelope.newest())]
    } else {
        artifacts
            .iter()
            .map(|artifact| (artifact.to_string(), artifact.lookup(envelope)))
            .collect()
    };

    let mut unanalyzed = Vec::new();
    let mut flagged = SeveritySummary::default();

    for (label, scan) in checks {
        match scan {
            None => unanalyzed.push(label),
            Some(scan) => {
                let summary = summarize_scan(scan);
                debug!("{} scan of {}: {}", category, scan.artifact, summary);
                if summary.critical > 0 {
                    flagged.add(&summary);
                }
            }
        }
    }

    if !unanalyzed.is_empty() {
        GateDecision::Warn(GateWarning {
            reason: WarnReason::NoAnalysis,
            summary: flagged,
            unanalyzed,
        })
    } else if flagged.critical > 0 {
        GateDecision::Warn(GateWarning {
            reason: WarnReason::CriticalFound,
            summary: flagged,
            unanalyzed,
        })
    } else {
        GateDecision::Clear
    }
}

/// Sums the findings of every tool that scanned an artifact
pub fn summarize_scan(scan: &ArtifactScan) -> SeveritySummary {
    let mut total = SeveritySummary::default();
    for (tool, report) in &scan.tools {
        let summary = summarize_report(report);
        debug!("{} reported {}", tool, summary);
        total.add(&summary);
    }
    total
}

/// Extracts severity counts from a single tool report
pub fn summarize_report(report: &Value) -> SeveritySummary {
    if let Some(runs) = report.get("runs").and_then(Value::as_array) {
        return summarize_sarif(runs);
    }

    if let Some(results) = report.get("Results").and_then(Value::as_array) {
        return summarize_vulnerability_list(results);
    }

    if let Some(summary) = summary_object(report) {
        return summary;
    }

    debug!("Unrecognized scan report format, counting no findings");
    SeveritySummary::default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    fn record(self, summary: &mut SeveritySummary) {
        match self {
            Severity::Critical => summary.critical += 1,
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
        }
    }

    fn from_level(level: &str) -> Option<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "error" => Some(Severity::Critical),
            "warning" => Some(Severity::High),
            "note" => Some(Severity::Medium),
            "none" => Some(Severity::Low),
            _ => None,
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Some(Severity::Critical),
            "high" | "major" | "error" => Some(Severity::High),
            "medium" | "moderate" | "warning" => Some(Severity::Medium),
            "low" | "minor" | "info" | "note" | "unknown" | "negligible" => Some(Severity::Low),
            _ => None,
        }
    }

    fn from_score(score: f64) -> Self {
        if score >= 9.0 {
            Severity::Critical
        } else if score >= 7.0 {
            Severity::High
        } else if score >= 4.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

fn summarize_sarif(runs: &[Value]) -> SeveritySummary {
    let mut summary = SeveritySummary::default();

    for run in runs {
        let rules = rule_descriptors(run);
        let results = run
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for result in results {
            let descriptor = descriptor_for(result, &rules);
            classify_finding(result, descriptor).record(&mut summary);
        }
    }

    summary
}

struct RuleIndex<'a> {
    by_position: Vec<&'a Value>,
    by_id: HashMap<&'a str, &'a Value>,
}

fn rule_descriptors(run: &Value) -> RuleIndex<'_> {
    let by_position: Vec<&Value> = run
        .pointer("/tool/driver/rules")
        .and_then(Value::as_array)
        .map(|rules| rules.iter().collect())
        .unwrap_or_default();

    let by_id = by_position
        .iter()
        .copied()
        .filter_map(|rule| rule.get("id").and_then(Value::as_str).map(|id| (id, rule)))
        .collect();

    RuleIndex { by_position, by_id }
}

fn descriptor_for<'a>(result: &Value, rules: &RuleIndex<'a>) -> Option<&'a Value> {
    let by_index = result
        .get("ruleIndex")
        .or_else(|| result.pointer("/rule/index"))
        .and_then(Value::as_u64)
        .and_then(|idx| rules.by_position.get(idx as usize).copied());

    by_index.or_else(|| {
        result
            .get("ruleId")
            .or_else(|| result.pointer("/rule/id"))
            .and_then(Value::as_str)
            .and_then(|id| rules.by_id.get(id).copied())
    })
}

fn classify_finding(result: &Value, descriptor: Option<&Value>) -> Severity {
    level_severity(result, descriptor)
        .or_else(|| property_severity(result.get("properties")))
        .or_else(|| property_severity(descriptor.and_then(|d| d.get("properties"))))
        .or_else(|| tag_severity(result.get("properties")))
        .or_else(|| tag_severity(descriptor.and_then(|d| d.get("properties"))))
        .unwrap_or(Severity::Low)
}

fn level_severity(result: &Value, descriptor: Option<&Value>) -> Option<Severity> {
    [
        result.pointer("/rule/level"),
        result.get("level"),
        descriptor.and_then(|d| d.pointer("/defaultConfiguration/level")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find_map(Severity::from_level)
}

fn property_severity(properties: Option<&Value>) -> Option<Severity> {
    let properties = properties?;

    if let Some(word) = properties.get("severity").and_then(Value::as_str) {
        if let Some(severity) = Severity::from_word(word) {
            return Some(severity);
        }
    }

    let score = properties.get("security-severity")?;
    let score = match score {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    Some(Severity::from_score(score))
}

fn tag_severity(properties: Option<&Value>) -> Option<Severity> {
    properties?
        .get("tags")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .find_map(Severity::from_word)
}

fn summarize_vulnerability_list(results: &[Value]) -> SeveritySummary {
    let mut summary = SeveritySummary::default();

    for result in results {
        let Some(vulns) = result.get("Vulnerabilities").and_then(Value::as_array) else {
            continue;
        };
        for vuln in vulns {
            vuln.get("Severity")
                .and_then(Value::as_str)
                .and_then(Severity::from_word)
                .unwrap_or(Severity::Low)
                .record(&mut summary);
        }
    }

    summary
}

fn summary_object(report: &Value) -> Option<SeveritySummary> {
    let object = report.as_object()?;
    let count = |key: &str| object.get(key).and_then(Value::as_u64).map(|n| n as u32);

    let counts = [count("critical"), count("high"), count("medium"), count("low")];
    if counts.iter().all(Option::is_none) {
        return None;
    }

    let [critical, high, medium, low] = counts.map(Option::unwrap_or_default);
    Some(SeveritySummary {
        critical,
        high,
        medium,
        low,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scan(artifact: &str, tools: Vec<(&str, Value)>) -> ArtifactScan {
        ArtifactScan {
            artifact: artifact.to_string(),
            tools: tools
                .into_iter()
                .map(|(name, report)| (name.to_string(), report))
                .collect(),
            scanned_at: None,
        }
    }

    fn envelope(category: ScanCategory, scans: Vec<ArtifactScan>) -> ScanResultEnvelope {
        ScanResultEnvelope {
            service_id: 1,
            category,
            scans,
        }
    }

    fn sarif_two_errors_one_warning() -> Value {
        json!({
            "runs": [{
                "tool": { "driver": { "name": "semgrep" } },
                "results": [
                    { "ruleId": "a", "rule": { "id": "a", "level": "error" } },
                    { "ruleId": "b", "rule": { "id": "b", "level": "error" } },
                    { "ruleId": "c", "rule": { "id": "c", "level": "warning" } }
                ]
            }]
        })
    }

    #[test]
    fn test_rule_level_counts_and_critical_warning() {
        let result = envelope(
            ScanCategory::Sast,
            vec![scan("abc123", vec![("semgrep", sarif_two_errors_one_warning())])],
        );

        let summary = summarize_scan(&result.scans[0]);
        assert_eq!(
            summary,
            SeveritySummary {
                critical: 2,
                high: 1,
                medium: 0,
                low: 0
            }
        );

        let decision = evaluate(ScanCategory::Sast, Stage::Build, Some(&result), &[]);
        assert_eq!(
            decision,
            GateDecision::Warn(GateWarning {
                reason: WarnReason::CriticalFound,
                summary,
                unanalyzed: vec![],
            })
        );
    }

    #[test]
    fn test_no_result_is_no_analysis() {
        let decision = evaluate(ScanCategory::Sast, Stage::Build, None, &[]);
        let GateDecision::Warn(warning) = decision else {
            panic!("expected a warning");
        };
        assert_eq!(warning.reason, WarnReason::NoAnalysis);
        assert!(warning.summary.is_empty());
    }

    #[test]
    fn test_clean_scan_is_clear() {
        let result = envelope(
            ScanCategory::Sast,
            vec![scan(
                "abc123",
                vec![("codeql", json!({ "runs": [{ "results": [{ "level": "note" }] }] }))],
            )],
        );

        assert!(evaluate(ScanCategory::Sast, Stage::Build, Some(&result), &[]).is_clear());
    }

    #[test]
    fn test_severity_fallback_chain() {
        let report = json!({
            "runs": [{
                "tool": { "driver": { "rules": [
                    { "id": "R1", "defaultConfiguration": { "level": "error" } },
                    { "id": "R2", "properties": { "security-severity": "7.5" } },
                    { "id": "R3", "properties": { "tags": ["security", "medium"] } }
                ] } },
                "results": [
                    { "ruleIndex": 0 },
                    { "ruleId": "R2" },
                    { "ruleId": "R3" },
                    { "ruleId": "R4", "properties": { "severity": "CRITICAL" } },
                    { "ruleId": "R5", "properties": { "security-severity": 9.8 } },
                    { "ruleId": "R6" }
                ]
            }]
        });

        assert_eq!(
            summarize_report(&report),
            SeveritySummary {
                critical: 3,
                high: 1,
                medium: 1,
                low: 1
            }
        );
    }

    #[test]
    fn test_rule_level_wins_over_properties() {
        let report = json!({
            "runs": [{ "results": [
                { "level": "warning", "properties": { "security-severity": "9.9", "tags": ["critical"] } }
            ] }]
        });

        assert_eq!(summarize_report(&report).high, 1);
    }

    #[test]
    fn test_counts_aggregate_across_tools() {
        let result = scan(
            "abc123",
            vec![
                ("semgrep", sarif_two_errors_one_warning()),
                ("codeql", json!({ "runs": [{ "results": [{ "level": "error" }] }] })),
            ],
        );

        assert_eq!(summarize_scan(&result).critical, 3);
    }

    #[test]
    fn test_vulnerability_list_and_summary_object() {
        let trivy = json!({
            "Results": [
                { "Vulnerabilities": [
                    { "Severity": "CRITICAL" }, { "Severity": "HIGH" }, { "Severity": "UNKNOWN" }
                ] },
                { "Target": "no vulns" }
            ]
        });
        assert_eq!(
            summarize_report(&trivy),
            SeveritySummary {
                critical: 1,
                high: 1,
                medium: 0,
                low: 1
            }
        );

        let summary = json!({ "critical": 0, "high": 4 });
        assert_eq!(summarize_report(&summary).high, 4);

        assert!(summarize_report(&json!({ "unrelated": true })).is_empty());
    }

    #[test]
    fn test_multi_image_unanalyzed_still_reports_criticals() {
        let result = envelope(
            ScanCategory::Sca,
            vec![scan(
                "registry.example.com/worker:v2",
                vec![("trivy", json!({ "critical": 3, "high": 0, "medium": 0, "low": 0 }))],
            )],
        );
        let artifacts = vec![
            SelectedArtifact::image("api", "v1"),
            SelectedArtifact::image("worker", "v2"),
        ];

        let decision = evaluate(ScanCategory::Sca, Stage::Deploy, Some(&result), &artifacts);

        let GateDecision::Warn(warning) = decision else {
            panic!("expected a warning");
        };
        assert_eq!(warning.reason, WarnReason::NoAnalysis);
        assert_eq!(warning.summary.critical, 3);
        assert_eq!(warning.unanalyzed, vec!["api:v1".to_string()]);
    }

    #[test]
    fn test_multi_image_criticals_are_summed() {
        let result = envelope(
            ScanCategory::Sca,
            vec![
                scan("api:v1", vec![("trivy", json!({ "critical": 2, "low": 5 }))]),
                scan("worker:v1", vec![("trivy", json!({ "critical": 1 }))]),
                scan("web:v1", vec![("trivy", json!({ "high": 7 }))]),
            ],
        );
        let artifacts = vec![
            SelectedArtifact::image("api", "v1"),
            SelectedArtifact::image("worker", "v1"),
            SelectedArtifact::image("web", "v1"),
        ];

        let GateDecision::Warn(warning) =
            evaluate(ScanCategory::Sca, Stage::Deploy, Some(&result), &artifacts)
        else {
            panic!("expected a warning");
        };
        assert_eq!(warning.reason, WarnReason::CriticalFound);
        assert_eq!(
            warning.summary,
            SeveritySummary {
                critical: 3,
                high: 0,
                medium: 0,
                low: 5
            }
        );
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let result = envelope(
            ScanCategory::Sast,
            vec![scan("abc", vec![("semgrep", sarif_two_errors_one_warning())])],
        );
        let first = evaluate(ScanCategory::Sast, Stage::Build, Some(&result), &[]);
        let second = evaluate(ScanCategory::Sast, Stage::Build, Some(&result), &[]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_artifact_selection() {
        assert!(ArtifactSelection::None.is_empty());
        assert!(ArtifactSelection::Image("  ".to_string()).is_empty());
        assert!(ArtifactSelection::PerService(BTreeMap::new()).is_empty());

        let map = BTreeMap::from([
            ("api".to_string(), "v2".to_string()),
            ("worker".to_string(), "v2".to_string()),
        ]);
        let selection = ArtifactSelection::PerService(map);
        assert!(!selection.is_empty());
        assert_eq!(
            selection.artifacts(),
            vec![
                SelectedArtifact::image("api", "v2"),
                SelectedArtifact::image("worker", "v2"),
            ]
        );
        assert_eq!(
            ArtifactSelection::Image(" abc123 ".to_string()).artifacts(),
            vec![SelectedArtifact::bare("abc123")]
        );

        let partial = ArtifactSelection::PerService(BTreeMap::from([
            ("api".to_string(), "v2".to_string()),
            ("worker".to_string(), String::new()),
        ]));
        assert!(partial.is_empty());
    }

    #[test]
    fn test_shared_tag_checks_each_subservice() {
        let result = envelope(
            ScanCategory::Sca,
            vec![scan(
                "registry.example.com/api:v2",
                vec![("trivy", json!({ "critical": 0, "high": 1 }))],
            )],
        );
        let selection = ArtifactSelection::PerService(BTreeMap::from([
            ("api".to_string(), "v2".to_string()),
            ("worker".to_string(), "v2".to_string()),
        ]));

        let decision = evaluate(
            ScanCategory::Sca,
            Stage::Deploy,
            Some(&result),
            &selection.artifacts(),
        );

        let GateDecision::Warn(warning) = decision else {
            panic!("worker:v2 has no scan, expected a warning");
        };
        assert_eq!(warning.reason, WarnReason::NoAnalysis);
        assert_eq!(warning.unanalyzed, vec!["worker:v2".to_string()]);
        assert!(warning.summary.is_empty());
    }
}
