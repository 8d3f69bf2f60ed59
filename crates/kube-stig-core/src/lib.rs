//! kube-stig-core: Shared types for kube-stig
//!
//! Run scope, control outcomes, the report model and profile inputs. Nothing
//! here touches the host or the cluster.

pub mod error;
pub mod inputs;
pub mod types;

pub use error::CoreError;
pub use inputs::Inputs;
pub use types::*;
