//! kube-stig-probe: host and cluster introspection for STIG checks
//!
//! - [`kubelet`]: the local kubelet's flags and config file
//! - [`kubectl`]: cluster queries through the kubectl CLI
//! - [`eks`]: managed control-plane metadata from the EKS API

pub mod eks;
pub mod error;
pub mod flags;
pub mod kubectl;
pub mod kubelet;
pub mod platform;

pub use eks::{
    AddonDescriptor, ApiError, ClusterApi, ClusterDescriptor, EksApi, ManagedCluster,
    ManagedClusterError,
};
pub use error::ProbeError;
pub use flags::ProcessFlags;
pub use kubectl::{CommandRunner, Kubectl, KubectlOptions, KubectlOutput, SystemRunner, Table};
pub use kubelet::Kubelet;
pub use platform::Platform;
