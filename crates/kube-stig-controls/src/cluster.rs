//! Cluster checks answered through kubectl
//!
//! A listing that cannot be obtained propagates as an error carrying
//! kubectl's classified message, never as an empty (passing) listing.

use crate::context::CheckContext;
use crate::error::ControlError;
use crate::findings::Findings;
use futures::FutureExt;
use futures::future::BoxFuture;
use kube_stig_core::Outcome;
use serde_json::Value;
use std::collections::BTreeMap;

/// Namespaces reserved for Kubernetes system components
const SYSTEM_NAMESPACES: &[&str] = &["kube-system", "kube-node-lease", "kube-public"];

/// Namespaces that must not hold user-managed resources
const RESERVED_NAMESPACES: &[&str] = &["default", "kube-public", "kube-node-lease"];

/// Pod name prefixes of known system components
const SYSTEM_POD_PREFIXES: &[&str] = &[
    "kube-", "calico-", "coredns", "etcd", "aws-", "ebs-", "efs-", "vpc-", "eks-",
];

const PRIVILEGED_PORT_LIMIT: i64 = 1024;

type CheckFuture<'a> = BoxFuture<'a, Result<Outcome, ControlError>>;

fn name_of(item: &Value) -> &str {
    item.pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
}

fn namespace_of(item: &Value) -> &str {
    item.pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

/// Repository part of an image reference, without tag or digest
pub fn image_base(image: &str) -> &str {
    let without_digest = image.split('@').next().unwrap_or(image);
    match without_digest.rfind(':') {
        Some(colon) if !without_digest[colon..].contains('/') => &without_digest[..colon],
        _ => without_digest,
    }
}

/// V-242383
pub fn user_resources_in_system_namespaces(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let mut findings = Findings::new();
        for ns in RESERVED_NAMESPACES {
            let items = ctx.kubectl().resources("all", Some(ns))?;

            let user: Vec<String> = items
                .iter()
                .filter(|item| {
                    !(name_of(item) == "kubernetes"
                        && item.get("kind").and_then(Value::as_str) == Some("Service"))
                })
                .map(|item| {
                    format!(
                        "{}/{}",
                        item.get("kind").and_then(Value::as_str).unwrap_or("Unknown"),
                        name_of(item)
                    )
                })
                .collect();

            findings.expect(user.is_empty(), || {
                format!(
                    "Found {} user-managed resource(s) in system namespace '{}': {}",
                    user.len(),
                    ns,
                    user.join(", ")
                )
            });
        }
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242395
pub fn dashboard_disabled(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let pods = ctx
            .kubectl()
            .list("get pods --all-namespaces -l k8s-app=kubernetes-dashboard -o json")?;

        let mut findings = Findings::new();
        findings.expect(pods.is_empty(), || {
            let names: Vec<String> = pods
                .iter()
                .map(|p| format!("{} in namespace {}", name_of(p), namespace_of(p)))
                .collect();
            format!(
                "Found {} Kubernetes dashboard pod(s) running: {}",
                pods.len(),
                names.join(", ")
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242414
pub fn privileged_ports(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let pods = ctx.kubectl().resources("pods", None)?;

        let mut offenders = Vec::new();
        for pod in pods
            .iter()
            .filter(|p| !SYSTEM_NAMESPACES.contains(&namespace_of(p)))
        {
            let containers = pod
                .pointer("/spec/containers")
                .and_then(Value::as_array)
                .into_iter()
                .flatten();
            for container in containers {
                let ports: Vec<String> = container
                    .get("ports")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|port| {
                        let container_port = port.get("containerPort").and_then(Value::as_i64);
                        let host_port = port.get("hostPort").and_then(Value::as_i64);
                        if let Some(p) = container_port.filter(|p| *p < PRIVILEGED_PORT_LIMIT) {
                            Some(p.to_string())
                        } else {
                            host_port
                                .filter(|p| *p < PRIVILEGED_PORT_LIMIT)
                                .map(|p| format!("{} (hostPort)", p))
                        }
                    })
                    .collect();

                if !ports.is_empty() {
                    offenders.push(format!(
                        "Pod: {} (namespace: {}, container: {}) Ports: {}",
                        name_of(pod),
                        namespace_of(pod),
                        container.get("name").and_then(Value::as_str).unwrap_or_default(),
                        ports.join(", ")
                    ));
                }
            }
        }

        let mut findings = Findings::new();
        findings.expect(offenders.is_empty(), || {
            format!(
                "Found {} container(s) using privileged ports (< 1024) in user namespaces: {}",
                offenders.len(),
                offenders.join("; ")
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242415
pub fn secrets_in_env(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let references = ctx.kubectl().pods_with_secret_env_vars()?;
        let mut findings = Findings::new();
        findings.expect(references.is_empty(), || {
            let listed: Vec<String> = references
                .iter()
                .map(|r| format!("{}/{} container {}", r.namespace, r.pod, r.container))
                .collect();
            format!(
                "Found {} container(s) reading secrets through environment variables: {}",
                references.len(),
                listed.join(", ")
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242417
pub fn user_pods_in_system_namespaces(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let pods = ctx.kubectl().resources("pods", None)?;

        let mut findings = Findings::new();
        for ns in SYSTEM_NAMESPACES {
            let user: Vec<&str> = pods
                .iter()
                .filter(|p| namespace_of(p) == *ns)
                .map(name_of)
                .filter(|name| !SYSTEM_POD_PREFIXES.iter().any(|prefix| name.starts_with(prefix)))
                .collect();

            findings.expect(user.is_empty(), || {
                format!(
                    "Found {} potential user pod(s) in system namespace '{}'; confirm each is a system component: {}",
                    user.len(),
                    ns,
                    user.join(", ")
                )
            });
        }
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242442
pub fn stale_image_versions(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let pods = ctx.kubectl().resources("pods", None)?;

        let mut versions: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for pod in &pods {
            let containers = ["/spec/containers", "/spec/initContainers"]
                .iter()
                .filter_map(|path| pod.pointer(path).and_then(Value::as_array))
                .flatten();
            for image in containers.filter_map(|c| c.get("image").and_then(Value::as_str)) {
                let seen = versions.entry(image_base(image)).or_default();
                if !seen.contains(&image) {
                    seen.push(image);
                }
            }
        }

        let stale: Vec<String> = versions
            .iter()
            .filter(|(_, images)| images.len() > 1)
            .map(|(base, images)| format!("{}: {}", base, images.join(", ")))
            .collect();

        let mut findings = Findings::new();
        findings.expect(stale.is_empty(), || {
            format!(
                "Found {} image(s) with multiple versions deployed; old components were not removed: {}",
                stale.len(),
                stale.join("; ")
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-274884
pub fn secret_access_review(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let sections = [
            ("Roles and ClusterRoles", "get roles,clusterroles -A -o name"),
            (
                "RoleBindings and ClusterRoleBindings",
                "get rolebindings,clusterrolebindings -A -o name",
            ),
            ("Workload resources", "get all -A -o name"),
        ];

        let mut reason = String::from(
            "Manual review required: verify all Secret access is limited to documented organizational requirements.",
        );
        for (heading, subcommand) in sections {
            let output = ctx.kubectl().execute(subcommand)?;
            let body = if output.success() {
                output.stdout.trim().to_string()
            } else {
                format!(
                    "Unable to retrieve: {}",
                    output.error_message().unwrap_or_default()
                )
            };
            reason.push_str(&format!("\n\n{}:\n{}", heading, body));
        }
        Ok(Outcome::not_reviewed(reason))
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use kube_stig_probe::ProbeError;
    use kube_stig_probe::kubectl::CONNECTIVITY_MESSAGE;
    use serde_json::json;

    const ALL_PODS: &str = "get pods --all-namespaces -o json";

    fn pod(ns: &str, name: &str, containers: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": ns},
            "spec": {"containers": containers}
        })
    }

    fn list(items: Vec<Value>) -> String {
        json!({"apiVersion": "v1", "kind": "List", "items": items}).to_string()
    }

    #[tokio::test]
    async fn test_connectivity_failure_is_error_not_pass() {
        let ctx = cluster_context(FakeKubectl::default().fail(
            ALL_PODS,
            "The connection to the server localhost:8080 was refused - did you specify the right host or port?\n\
             dial tcp 127.0.0.1:8080: connect: connection refused",
        ));
        let checks: [crate::CheckFn; 3] =
            [secrets_in_env, privileged_ports, user_pods_in_system_namespaces];
        for check in checks {
            let err = check(&ctx).await.unwrap_err();
            assert!(matches!(
                err,
                ControlError::Probe(ProbeError::Kubectl { connectivity: true, .. })
            ));
            assert_eq!(err.to_string(), CONNECTIVITY_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_undecodable_pod_is_error_not_pass() {
        let pods = list(vec![pod("shop", "odd-1", json!([{"name": 5}]))]);
        let ctx = cluster_context(FakeKubectl::default().respond(ALL_PODS, &pods));
        assert!(matches!(
            secrets_in_env(&ctx).await,
            Err(ControlError::Probe(ProbeError::Json(_)))
        ));
    }

    #[tokio::test]
    async fn test_unparsable_output_is_error() {
        let ctx = cluster_context(FakeKubectl::default().respond(ALL_PODS, "No resources found"));
        assert_eq!(
            privileged_ports(&ctx).await.unwrap_err().to_string(),
            "kubectl output could not be parsed as JSON"
        );
    }

    #[tokio::test]
    async fn test_reserved_namespaces_ignore_kubernetes_service() {
        let kubernetes_svc = json!({"kind": "Service", "metadata": {"name": "kubernetes"}});
        let app = json!({"kind": "Deployment", "metadata": {"name": "web"}});
        let ctx = cluster_context(
            FakeKubectl::default()
                .respond("-n default get all -o json", &list(vec![kubernetes_svc, app]))
                .respond("-n kube-public get all -o json", &list(vec![]))
                .respond("-n kube-node-lease get all -o json", &list(vec![])),
        );

        match user_resources_in_system_namespaces(&ctx).await.unwrap() {
            Outcome::Fail { evidence } => {
                assert_eq!(evidence.len(), 1);
                assert!(evidence[0].ends_with("'default': Deployment/web"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dashboard() {
        let ctx = cluster_context(FakeKubectl::default().respond(
            "get pods --all-namespaces -l k8s-app=kubernetes-dashboard -o json",
            &list(vec![]),
        ));
        assert_eq!(dashboard_disabled(&ctx).await.unwrap(), Outcome::Pass);
    }

    #[tokio::test]
    async fn test_privileged_ports_skip_system_namespaces() {
        let pods = list(vec![
            pod("kube-system", "coredns-abc", json!([{"name": "coredns", "ports": [{"containerPort": 53}]}])),
            pod("shop", "web-1", json!([{"name": "nginx", "ports": [{"containerPort": 8080, "hostPort": 80}]}])),
            pod("shop", "api-1", json!([{"name": "api", "ports": [{"containerPort": 8443}]}])),
            pod("shop", "dns-1", json!([{"name": "dns", "ports": [{"containerPort": 53, "hostPort": 5353}]}])),
        ]);
        let ctx = cluster_context(FakeKubectl::default().respond(ALL_PODS, &pods));

        match privileged_ports(&ctx).await.unwrap() {
            Outcome::Fail { evidence } => {
                assert!(evidence[0].contains("Found 2 container(s)"));
                assert!(evidence[0].contains("Pod: web-1 (namespace: shop, container: nginx) Ports: 80 (hostPort)"));
                assert!(evidence[0].contains("Pod: dns-1 (namespace: shop, container: dns) Ports: 53"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_secrets_in_env() {
        let pods = list(vec![
            pod(
                "shop",
                "api-1",
                json!([{"name": "api", "env": [{"name": "DB_PASSWORD", "valueFrom": {"secretKeyRef": {"name": "db", "key": "password"}}}]}]),
            ),
            pod("shop", "web-1", json!([{"name": "nginx", "env": [{"name": "MODE", "value": "prod"}]}])),
        ]);
        let ctx = cluster_context(FakeKubectl::default().respond(ALL_PODS, &pods));
        assert_eq!(
            secrets_in_env(&ctx).await.unwrap(),
            Outcome::fail(
                "Found 1 container(s) reading secrets through environment variables: shop/api-1 container api"
            )
        );
    }

    #[tokio::test]
    async fn test_user_pods_in_system_namespaces() {
        let pods = list(vec![
            pod("kube-system", "coredns-5d78c9869d-abcde", json!([])),
            pod("kube-system", "aws-node-xyz", json!([])),
            pod("kube-system", "my-app-1", json!([])),
            pod("shop", "my-app-2", json!([])),
        ]);
        let ctx = cluster_context(FakeKubectl::default().respond(ALL_PODS, &pods));

        match user_pods_in_system_namespaces(&ctx).await.unwrap() {
            Outcome::Fail { evidence } => {
                assert_eq!(evidence.len(), 1);
                assert!(evidence[0].ends_with("my-app-1"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_image_versions() {
        let pods = list(vec![
            pod("shop", "web-1", json!([{"name": "web", "image": "nginx:1.25"}])),
            pod("shop", "web-2", json!([{"name": "web", "image": "nginx:1.27"}])),
            pod("shop", "api-1", json!([{"name": "api", "image": "registry:5000/shop/api:2.0"}])),
            pod("shop", "api-2", json!([{"name": "api", "image": "registry:5000/shop/api:2.0"}])),
        ]);
        let ctx = cluster_context(FakeKubectl::default().respond(ALL_PODS, &pods));
        assert_eq!(
            stale_image_versions(&ctx).await.unwrap(),
            Outcome::fail(
                "Found 1 image(s) with multiple versions deployed; old components were not removed: nginx: nginx:1.25, nginx:1.27"
            )
        );
    }

    #[test]
    fn test_image_base() {
        assert_eq!(image_base("nginx:1.25"), "nginx");
        assert_eq!(image_base("nginx"), "nginx");
        assert_eq!(image_base("registry:5000/shop/api:2.0"), "registry:5000/shop/api");
        assert_eq!(image_base("registry:5000/shop/api"), "registry:5000/shop/api");
        assert_eq!(image_base("nginx@sha256:abc"), "nginx");
    }

    #[tokio::test]
    async fn test_secret_access_review_is_manual() {
        let ctx = cluster_context(
            FakeKubectl::default()
                .respond("get roles,clusterroles -A -o name", "clusterrole.rbac.authorization.k8s.io/admin\n")
                .respond("get all -A -o name", "pod/web-1\n"),
        );
        match secret_access_review(&ctx).await.unwrap() {
            Outcome::NotReviewed { reason } => {
                assert!(reason.contains("clusterrole.rbac.authorization.k8s.io/admin"));
                assert!(reason.contains("RoleBindings and ClusterRoleBindings:\nUnable to retrieve:"));
                assert!(reason.contains("pod/web-1"));
            }
            other => panic!("expected manual review, got {:?}", other),
        }
    }
}
