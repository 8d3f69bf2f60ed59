//! Expectation accumulator used by check bodies

use kube_stig_core::Outcome;

/// Collects failed expectations and skip reasons for one control
///
/// Any failure makes the control fail. Otherwise any skip makes it
/// not reviewed. Otherwise it passes.
#[derive(Debug, Clone, Default)]
pub struct Findings {
    evidence: Vec<String>,
    skipped: Vec<String>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure with `evidence()` unless `ok` holds
    pub fn expect(&mut self, ok: bool, evidence: impl FnOnce() -> String) -> &mut Self {
        if !ok {
            self.evidence.push(evidence());
        }
        self
    }

    /// Record an expectation that could not be evaluated
    pub fn skip(&mut self, reason: impl Into<String>) -> &mut Self {
        self.skipped.push(reason.into());
        self
    }

    pub fn failed(&self) -> bool {
        !self.evidence.is_empty()
    }

    pub fn into_outcome(self) -> Outcome {
        if !self.evidence.is_empty() {
            Outcome::Fail {
                evidence: self.evidence,
            }
        } else if !self.skipped.is_empty() {
            Outcome::not_reviewed(self.skipped.join("\n"))
        } else {
            Outcome::Pass
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_expectations_passes() {
        assert_eq!(Findings::new().into_outcome(), Outcome::Pass);
    }

    #[test]
    fn test_each_failure_keeps_its_evidence() {
        let mut findings = Findings::new();
        findings
            .expect(false, || "flag present".to_string())
            .expect(true, || unreachable!())
            .expect(false, || "config wrong".to_string());
        assert_eq!(
            findings.into_outcome(),
            Outcome::Fail {
                evidence: vec!["flag present".to_string(), "config wrong".to_string()]
            }
        );
    }

    #[test]
    fn test_failure_outranks_skip() {
        let mut findings = Findings::new();
        findings.skip("featureGates not set");
        assert!(matches!(findings.clone().into_outcome(), Outcome::NotReviewed { .. }));

        findings.expect(false, || "flag present".to_string());
        assert!(findings.failed());
        assert!(findings.into_outcome().is_fail());
    }
}
