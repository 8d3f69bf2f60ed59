//! kube-stig-controls: The control catalog and its runner
//!
//! Each control is an async check over a [`CheckContext`]. The runner gates
//! controls by run scope and turns any check error into an `Error` outcome
//! for that control alone.

pub mod catalog;
pub mod cluster;
pub mod context;
pub mod control;
pub mod eks;
pub mod error;
pub mod files;
pub mod findings;
pub mod managed;
pub mod node;
pub mod runner;

pub use catalog::{catalog, select};
pub use context::{CheckContext, SharedRunner};
pub use control::{CheckFn, Control};
pub use error::ControlError;
pub use findings::Findings;
pub use runner::{run_control, run_controls};
