//! Control definition

use crate::context::CheckContext;
use crate::error::ControlError;
use futures::future::BoxFuture;
use kube_stig_core::{Outcome, RunScope, Severity};

/// Check body of a control
pub type CheckFn = for<'a> fn(&'a CheckContext) -> BoxFuture<'a, Result<Outcome, ControlError>>;

/// One STIG control
#[derive(Clone, Copy)]
pub struct Control {
    /// STIG vulnerability id, e.g. `V-242387`
    pub id: &'static str,
    pub title: &'static str,
    pub severity: Severity,
    /// Scope the control runs in; `None` runs in every scope
    pub scope: Option<RunScope>,
    pub check: CheckFn,
}

impl Control {
    pub fn new(
        id: &'static str,
        title: &'static str,
        impact: f32,
        scope: Option<RunScope>,
        check: CheckFn,
    ) -> Self {
        Self {
            id,
            title,
            severity: Severity::from_impact(impact),
            scope,
            check,
        }
    }

    pub fn node(id: &'static str, title: &'static str, impact: f32, check: CheckFn) -> Self {
        Self::new(id, title, impact, Some(RunScope::Node), check)
    }

    pub fn cluster(id: &'static str, title: &'static str, impact: f32, check: CheckFn) -> Self {
        Self::new(id, title, impact, Some(RunScope::Cluster), check)
    }
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Control")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
