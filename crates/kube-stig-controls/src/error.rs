//! Error types for kube-stig-controls

use kube_stig_probe::{ManagedClusterError, ProbeError};
use thiserror::Error;

/// Reasons a control could not be evaluated
#[derive(Error, Debug)]
pub enum ControlError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    ManagedCluster(#[from] ManagedClusterError),

    /// A required run input was not provided
    #[error("Missing required input: {0}")]
    MissingInput(&'static str),

    #[error("No EKS API client configured for cluster {0}")]
    NoClusterApi(String),

    #[error("No running kubelet process found on this host")]
    KubeletNotRunning,

    #[error("Unknown control: {0}")]
    UnknownControl(String),
}
