//! Control execution
//!
//! Controls run one after another. Whatever happens inside one control (an
//! error, a panic) is recorded against that control and the run moves on.

use crate::context::CheckContext;
use crate::control::Control;
use futures::FutureExt;
use kube_stig_core::{ControlReport, Outcome};
use std::panic::AssertUnwindSafe;

/// Evaluate one control, gated by the run scope
pub async fn run_control(control: &Control, ctx: &CheckContext) -> ControlReport {
    let outcome = if !ctx.scope().allows(control.scope) {
        let required = control.scope.map_or("any", |s| s.pass_label());
        tracing::debug!("{} skipped: runs in {} only", control.id, required);
        Outcome::not_applicable(format!("Runs in the {} only", required))
    } else {
        tracing::info!("Running {}", control.id);
        match AssertUnwindSafe((control.check)(ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::warn!("{} could not be evaluated: {}", control.id, e);
                Outcome::error(e.to_string())
            }
            Err(_) => {
                tracing::error!("{} panicked", control.id);
                Outcome::error("check panicked")
            }
        }
    };

    tracing::info!("{} {}", control.id, outcome.label());
    ControlReport {
        id: control.id.to_string(),
        title: control.title.to_string(),
        severity: control.severity,
        outcome,
    }
}

/// Evaluate every control in order
pub async fn run_controls(controls: &[Control], ctx: &CheckContext) -> Vec<ControlReport> {
    let mut reports = Vec::with_capacity(controls.len());
    for control in controls {
        reports.push(run_control(control, ctx).await);
    }
    reports
}
