//! Cluster checks answered by the EKS API

use crate::context::CheckContext;
use crate::error::ControlError;
use crate::findings::Findings;
use futures::FutureExt;
use futures::future::BoxFuture;
use kube_stig_core::Outcome;
use kube_stig_probe::ManagedCluster;

const KUBE_PROXY_ADDON: &str = "kube-proxy";

type CheckFuture<'a> = BoxFuture<'a, Result<Outcome, ControlError>>;

fn not_found_note(cluster: &ManagedCluster) -> String {
    if cluster.exists() {
        String::new()
    } else {
        format!(" (EKS cluster {} was not found)", cluster.name())
    }
}

/// V-242427, V-242428 and V-242432
pub fn secrets_encryption(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let cluster = &ctx.managed_cluster().await?;
        let mut findings = Findings::new();
        findings.expect(cluster.secrets_encrypted(), || {
            format!(
                "EKS cluster must have secrets encryption enabled to protect etcd data at rest{}",
                not_found_note(cluster)
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242461 through V-242465
pub fn audit_logging(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let cluster = &ctx.managed_cluster().await?;
        let mut findings = Findings::new();
        findings.expect(cluster.audit_logging_enabled(), || {
            format!(
                "EKS cluster audit logging is not enabled for cluster {}{}. Enabled log types: [{}]. \
                 Enable it with: aws eks update-cluster-config --name {} \
                 --logging '{{\"clusterLogging\":[{{\"types\":[\"audit\"],\"enabled\":true}}]}}'. \
                 Logs are delivered to /aws/eks/{}/cluster",
                cluster.name(),
                not_found_note(cluster),
                cluster.enabled_log_types().join(", "),
                cluster.name(),
                cluster.name()
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242443
pub fn version_review(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let cluster = &ctx.managed_cluster().await?;
        Ok(Outcome::not_reviewed(format!(
            "Manual verification required to ensure the Kubernetes version is current. \
             Current EKS cluster version: {}. Cluster: {}. Compare against the Kubernetes \
             version skew policy and the EKS supported versions list.",
            cluster.version().unwrap_or("unknown"),
            cluster.name()
        )))
    }
    .boxed()
}

/// V-242448
pub fn kube_proxy_addon(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let cluster = &ctx.managed_cluster().await?;
        if !cluster.addon_active(KUBE_PROXY_ADDON).await? {
            return Ok(Outcome::not_reviewed(format!(
                "kube-proxy is not an active EKS add-on for cluster {}, so it is self-managed. \
                 Locate its kubeconfig (--kubeconfig) on each worker node and verify it is owned \
                 by root:root with: stat -c %U:%G <kubeconfig-path>",
                cluster.name()
            )));
        }

        let addon = cluster.addon_info(KUBE_PROXY_ADDON).await?;
        Ok(Outcome::not_applicable(format!(
            "kube-proxy is managed as an EKS add-on; AWS maintains its kubeconfig ownership. \
             Cluster: {}. Add-on status: {}. Add-on version: {}",
            cluster.name(),
            addon.as_ref().and_then(|a| a.status.as_deref()).unwrap_or("unknown"),
            addon.as_ref().and_then(|a| a.version.as_deref()).unwrap_or("unknown")
        )))
    }
    .boxed()
}

/// V-242410
pub fn endpoint_access(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let cluster = &ctx.managed_cluster().await?;
        Ok(Outcome::not_applicable(format!(
            "The API server is managed by AWS and only exposes HTTPS on port 443; PPSM compliance \
             of its ports and protocols is AWS's responsibility. Endpoint access: public={}, \
             private={}, public access CIDRs=[{}]",
            cluster.endpoint_public_access(),
            cluster.endpoint_private_access(),
            cluster.public_access_cidrs().join(", ")
        )))
    }
    .boxed()
}

/// V-254800
pub fn pod_security_admission(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let cluster = &ctx.managed_cluster().await?;
        Ok(Outcome::not_applicable(format!(
            "Pod Security Admission is enabled by default in EKS and its admission configuration \
             is managed by AWS; configure Pod Security Standards with pod-security.kubernetes.io \
             namespace labels. Current EKS cluster version: {}. Cluster: {}",
            cluster.version().unwrap_or("unknown"),
            cluster.name()
        )))
    }
    .boxed()
}
