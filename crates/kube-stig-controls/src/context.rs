//! Inputs and shared probes for one run
//!
//! Everything a check reads comes from here: the run scope and profile
//! inputs, the kubectl client, the host platform and the EKS API. Kubelet
//! snapshots and cluster descriptors are never shared between checks; each
//! call takes a fresh one.

use crate::error::ControlError;
use kube_stig_core::RunScope;
use kube_stig_probe::platform::{self, Platform};
use kube_stig_probe::{
    ClusterApi, CommandRunner, Kubectl, KubectlOptions, Kubelet, ManagedCluster, SystemRunner,
};
use std::sync::Arc;

/// Default location of the kubelet's own kubeconfig
pub const DEFAULT_KUBELET_KUBECONFIG: &str = "/var/lib/kubelet/kubeconfig";

/// Command runner shared by every check of a run
pub type SharedRunner = Arc<dyn CommandRunner + Send + Sync>;

pub struct CheckContext {
    scope: RunScope,
    cluster_name: Option<String>,
    kubelet_kubeconfig_path: String,
    kubectl: Kubectl<SharedRunner>,
    platform: Arc<dyn Platform>,
    cluster_api: Option<Arc<dyn ClusterApi>>,
}

impl std::fmt::Debug for CheckContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckContext")
            .field("scope", &self.scope)
            .field("cluster_name", &self.cluster_name)
            .field("kubelet_kubeconfig_path", &self.kubelet_kubeconfig_path)
            .field("kubectl", self.kubectl.options())
            .finish_non_exhaustive()
    }
}

impl CheckContext {
    /// Context for the local host with default kubectl options
    pub fn new(scope: RunScope) -> Self {
        let runner: SharedRunner = Arc::new(SystemRunner);
        Self {
            scope,
            cluster_name: None,
            kubelet_kubeconfig_path: DEFAULT_KUBELET_KUBECONFIG.to_string(),
            kubectl: Kubectl::with_runner(KubectlOptions::default(), runner),
            platform: Arc::from(platform::detect()),
            cluster_api: None,
        }
    }

    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    pub fn with_kubelet_kubeconfig_path(mut self, path: impl Into<String>) -> Self {
        self.kubelet_kubeconfig_path = path.into();
        self
    }

    pub fn with_kubectl_options(mut self, options: KubectlOptions) -> Self {
        let runner = self.kubectl.runner().clone();
        self.kubectl = Kubectl::with_runner(options, runner);
        self
    }

    pub fn with_runner(mut self, runner: SharedRunner) -> Self {
        let options = self.kubectl.options().clone();
        self.kubectl = Kubectl::with_runner(options, runner);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_cluster_api(mut self, api: Arc<dyn ClusterApi>) -> Self {
        self.cluster_api = Some(api);
        self
    }

    pub fn scope(&self) -> RunScope {
        self.scope
    }

    pub fn cluster_name(&self) -> Result<&str, ControlError> {
        self.cluster_name
            .as_deref()
            .ok_or(ControlError::MissingInput("cluster_name"))
    }

    pub fn kubelet_kubeconfig_path(&self) -> &str {
        &self.kubelet_kubeconfig_path
    }

    pub fn kubectl(&self) -> &Kubectl<SharedRunner> {
        &self.kubectl
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Snapshot of the kubelet as it is right now
    pub fn kubelet(&self) -> Kubelet {
        Kubelet::discover_with(self.platform.as_ref())
    }

    /// Fresh kubelet snapshot, or an error when no kubelet is running
    pub fn running_kubelet(&self) -> Result<Kubelet, ControlError> {
        let kubelet = self.kubelet();
        if kubelet.is_running() {
            Ok(kubelet)
        } else {
            Err(ControlError::KubeletNotRunning)
        }
    }

    /// Describe the EKS cluster anew for the calling check
    pub async fn managed_cluster(&self) -> Result<ManagedCluster, ControlError> {
        let name = self.cluster_name()?;
        let api = self
            .cluster_api
            .clone()
            .ok_or_else(|| ControlError::NoClusterApi(name.to_string()))?;

        Ok(ManagedCluster::describe(api, name).await?)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_missing_cluster_name() {
        let ctx = cluster_context(FakeKubectl::default());
        assert!(matches!(
            ctx.cluster_name(),
            Err(ControlError::MissingInput("cluster_name"))
        ));
    }

    #[test]
    fn test_each_kubelet_snapshot_reads_the_host_again() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = dir.path().join("config.yaml");
        std::fs::write(&cfg, "readOnlyPort: 10255\n").unwrap();
        let ctx = node_context("kubelet --v=2", vec![cfg.clone()]);

        let before = ctx.running_kubelet().unwrap();
        std::fs::write(&cfg, "readOnlyPort: 0\n").unwrap();
        let after = ctx.running_kubelet().unwrap();

        assert_eq!(before.lookup(&["readOnlyPort"]), Some(&serde_json::json!(10255)));
        assert_eq!(after.lookup(&["readOnlyPort"]), Some(&serde_json::json!(0)));
    }

    #[tokio::test]
    async fn test_each_check_describes_the_cluster_again() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let ctx = eks_context(FakeEks {
            describe_calls: calls.clone(),
            ..Default::default()
        });

        assert!(!ctx.managed_cluster().await.unwrap().exists());
        assert!(!ctx.managed_cluster().await.unwrap().exists());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_kubelet_not_running() {
        let ctx = node_context("", vec![]);
        assert!(matches!(
            ctx.running_kubelet(),
            Err(ControlError::KubeletNotRunning)
        ));
    }

    #[test]
    fn test_kubectl_options_keep_runner() {
        let ctx = cluster_context(FakeKubectl::default().respond("--context demo get ns", "ns/default"))
            .with_kubectl_options(KubectlOptions::new().with_context("demo"));
        let output = ctx.kubectl().execute("get ns").unwrap();
        assert_eq!(output.stdout, "ns/default");
    }

    #[tokio::test]
    async fn test_managed_cluster_requires_api() {
        let ctx = cluster_context(FakeKubectl::default()).with_cluster_name("demo");
        let err = ctx.managed_cluster().await.unwrap_err();
        assert_eq!(err.to_string(), "No EKS API client configured for cluster demo");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let ctx = eks_context(FakeEks {
            provider_error: Some("AccessDeniedException".to_string()),
            ..Default::default()
        });
        let err = ctx.managed_cluster().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "aws_eks_cluster(demo) error: AccessDeniedException"
        );
    }
}
