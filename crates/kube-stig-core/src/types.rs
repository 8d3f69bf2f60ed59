//! Domain types for kube-stig
//!
//! These types describe what a run is asked to do and what it found.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Where a run executes: against the cluster API or on a worker node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunScope {
    Cluster,
    Node,
}

impl RunScope {
    pub fn is_cluster(&self) -> bool {
        matches!(self, RunScope::Cluster)
    }

    pub fn is_node(&self) -> bool {
        matches!(self, RunScope::Node)
    }

    /// Whether a control that requires `required` runs in this scope
    ///
    /// `None` means the control runs in any scope.
    pub fn allows(&self, required: Option<RunScope>) -> bool {
        required.is_none_or(|r| r == *self)
    }

    /// Justification used when a control is skipped for scope
    pub fn pass_label(&self) -> &'static str {
        match self {
            RunScope::Cluster => "cluster pass",
            RunScope::Node => "node pass",
        }
    }
}

impl std::fmt::Display for RunScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunScope::Cluster => write!(f, "cluster"),
            RunScope::Node => write!(f, "node"),
        }
    }
}

impl FromStr for RunScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cluster" => Ok(RunScope::Cluster),
            "node" => Ok(RunScope::Node),
            _ => Err(CoreError::InvalidScope(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for RunScope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Control severity (STIG CAT level)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Map an InSpec-style impact score onto a severity
    pub fn from_impact(impact: f32) -> Self {
        if impact >= 0.7 {
            Severity::High
        } else if impact >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Severity::High => "CAT I",
            Severity::Medium => "CAT II",
            Severity::Low => "CAT III",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::High => write!(f, "high"),
            Severity::Medium => write!(f, "medium"),
            Severity::Low => write!(f, "low"),
        }
    }
}

/// Result of evaluating one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Pass,
    /// One entry per failed expectation
    Fail { evidence: Vec<String> },
    NotApplicable { justification: String },
    /// Manual review required
    NotReviewed { reason: String },
    /// The control could not be evaluated
    Error { diagnostic: String },
}

impl Outcome {
    pub fn fail(evidence: impl Into<String>) -> Self {
        Outcome::Fail {
            evidence: vec![evidence.into()],
        }
    }

    pub fn not_applicable(justification: impl Into<String>) -> Self {
        Outcome::NotApplicable {
            justification: justification.into(),
        }
    }

    pub fn not_reviewed(reason: impl Into<String>) -> Self {
        Outcome::NotReviewed {
            reason: reason.into(),
        }
    }

    pub fn error(diagnostic: impl Into<String>) -> Self {
        Outcome::Error {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Pass)
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Outcome::Fail { .. })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Pass => "●",
            Outcome::Fail { .. } => "✗",
            Outcome::NotApplicable { .. } => "○",
            Outcome::NotReviewed { .. } => "◐",
            Outcome::Error { .. } => "!",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Fail { .. } => "FAIL",
            Outcome::NotApplicable { .. } => "N/A",
            Outcome::NotReviewed { .. } => "NOT REVIEWED",
            Outcome::Error { .. } => "ERROR",
        }
    }

    /// Free-form text attached to the outcome, one line per entry
    pub fn details(&self) -> Vec<&str> {
        match self {
            Outcome::Pass => Vec::new(),
            Outcome::Fail { evidence } => evidence.iter().map(String::as_str).collect(),
            Outcome::NotApplicable { justification } => vec![justification.as_str()],
            Outcome::NotReviewed { reason } => vec![reason.as_str()],
            Outcome::Error { diagnostic } => vec![diagnostic.as_str()],
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One control's entry in a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReport {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub outcome: Outcome,
}

/// Outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub not_applicable: usize,
    pub not_reviewed: usize,
    pub errors: usize,
}

impl Summary {
    pub fn tally(controls: &[ControlReport]) -> Self {
        controls.iter().fold(
            Summary {
                total: controls.len(),
                ..Default::default()
            },
            |mut acc, c| {
                match c.outcome {
                    Outcome::Pass => acc.passed += 1,
                    Outcome::Fail { .. } => acc.failed += 1,
                    Outcome::NotApplicable { .. } => acc.not_applicable += 1,
                    Outcome::NotReviewed { .. } => acc.not_reviewed += 1,
                    Outcome::Error { .. } => acc.errors += 1,
                }
                acc
            },
        )
    }
}

/// Complete result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub scope: RunScope,
    pub cluster_name: Option<String>,
    pub controls: Vec<ControlReport>,
    pub summary: Summary,
}

impl Report {
    pub fn new(scope: RunScope, cluster_name: Option<String>, controls: Vec<ControlReport>) -> Self {
        let summary = Summary::tally(&controls);
        Self {
            generated_at: Utc::now(),
            scope,
            cluster_name,
            controls,
            summary,
        }
    }

    /// Whether any control failed or could not be evaluated
    pub fn has_findings(&self) -> bool {
        self.summary.failed > 0 || self.summary.errors > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(id: &str, outcome: Outcome) -> ControlReport {
        ControlReport {
            id: id.to_string(),
            title: format!("{} title", id),
            severity: Severity::Medium,
            outcome,
        }
    }

    #[test]
    fn test_scope_parses_case_insensitively() {
        assert_eq!("Cluster".parse::<RunScope>().unwrap(), RunScope::Cluster);
        assert_eq!("NODE".parse::<RunScope>().unwrap(), RunScope::Node);
        assert_eq!(" node ".parse::<RunScope>().unwrap(), RunScope::Node);
        assert!(matches!(
            "worker".parse::<RunScope>(),
            Err(CoreError::InvalidScope(s)) if s == "worker"
        ));
    }

    #[test]
    fn test_scope_gate() {
        assert!(RunScope::Cluster.is_cluster());
        assert!(!RunScope::Cluster.is_node());
        assert!(RunScope::Node.allows(None));
        assert!(RunScope::Node.allows(Some(RunScope::Node)));
        assert!(!RunScope::Node.allows(Some(RunScope::Cluster)));
        assert_eq!(RunScope::Cluster.pass_label(), "cluster pass");
    }

    #[test]
    fn test_severity_from_impact() {
        assert_eq!(Severity::from_impact(0.7), Severity::High);
        assert_eq!(Severity::from_impact(0.5), Severity::Medium);
        assert_eq!(Severity::from_impact(0.3), Severity::Low);
        assert_eq!(Severity::High.category(), "CAT I");
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(Outcome::fail("--read-only-port is set")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "fail", "evidence": ["--read-only-port is set"]})
        );
        let json = serde_json::to_value(Outcome::Pass).unwrap();
        assert_eq!(json, serde_json::json!({"status": "pass"}));
    }

    #[test]
    fn test_summary_counts() {
        let report = Report::new(
            RunScope::Cluster,
            Some("demo".to_string()),
            vec![
                control("V-1", Outcome::Pass),
                control("V-2", Outcome::fail("bad")),
                control("V-3", Outcome::not_applicable("node pass")),
                control("V-4", Outcome::not_reviewed("manual")),
                control("V-5", Outcome::error("aws_eks_cluster(demo) error: denied")),
                control("V-6", Outcome::Pass),
            ],
        );
        assert_eq!(
            report.summary,
            Summary {
                total: 6,
                passed: 2,
                failed: 1,
                not_applicable: 1,
                not_reviewed: 1,
                errors: 1,
            }
        );
        assert!(report.has_findings());
    }

    #[test]
    fn test_clean_report_has_no_findings() {
        let report = Report::new(RunScope::Node, None, vec![control("V-1", Outcome::Pass)]);
        assert!(!report.has_findings());
    }
}
