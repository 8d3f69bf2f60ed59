//! Worker node checks: kubelet flags, kubelet config and local files
//!
//! A flag and its config-file counterpart are separate expectations, so a
//! control reports each one that is wrong.

use crate::context::CheckContext;
use crate::error::ControlError;
use crate::files;
use crate::findings::Findings;
use futures::FutureExt;
use futures::future::BoxFuture;
use kube_stig_core::Outcome;
use kube_stig_probe::Kubelet;
use serde_json::Value;

/// Oldest kubectl without the `kubectl cp` traversal flaw
const MIN_KUBECTL_VERSION: (u32, u32, u32) = (1, 12, 9);

/// Shortest accepted streaming idle timeout, in minutes
const MIN_STREAMING_IDLE_MINUTES: f64 = 5.0;

const MAX_FILE_MODE: u32 = 0o644;

type CheckFuture<'a> = BoxFuture<'a, Result<Outcome, ControlError>>;

fn show(value: Option<&Value>) -> String {
    value.map_or_else(|| "unset".to_string(), Value::to_string)
}

fn config_path(kubelet: &Kubelet) -> &str {
    kubelet.config_path().unwrap_or("none")
}

fn flag_absent(findings: &mut Findings, kubelet: &Kubelet, flag: &str) {
    findings.expect(!kubelet.has_flag(flag), || {
        format!(
            "The --{} command-line flag was found on the kubelet process. Current value: {}",
            flag,
            kubelet.flag(flag).unwrap_or_default()
        )
    });
}

/// V-242387
pub fn read_only_port(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let port = kubelet.lookup(&["readOnlyPort"]);

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "read-only-port");
        findings.expect(port.is_none_or(|p| p.as_i64() == Some(0)), || {
            format!(
                "The kubelet readOnlyPort must be disabled by setting it to 0 or removing it. Config path: {}. Current value: {}",
                config_path(kubelet),
                show(port)
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242391
pub fn anonymous_auth(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let enabled = kubelet.lookup(&["authentication", "anonymous", "enabled"]);

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "anonymous-auth");
        findings.expect(enabled == Some(&Value::Bool(false)), || {
            format!(
                "The kubelet authentication.anonymous.enabled must be false. Config path: {}. Current value: {}",
                config_path(kubelet),
                show(enabled)
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242392
pub fn authorization_mode(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let mode = kubelet.lookup(&["authorization", "mode"]);

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "authorization-mode");
        findings.expect(mode.and_then(Value::as_str) == Some("Webhook"), || {
            format!(
                "The kubelet authorization.mode must be Webhook. Config path: {}. Current value: {}",
                config_path(kubelet),
                show(mode)
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242397
pub fn static_pod_path(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let path = kubelet.lookup(&["staticPodPath"]);

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "pod-manifest-path");
        findings.expect(path.is_none(), || {
            format!(
                "The kubelet staticPodPath must not be set on worker nodes. Config path: {}. Current value: {}",
                config_path(kubelet),
                show(path)
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242398
pub fn dynamic_auditing(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let gates = kubelet.lookup(&["featureGates"]);

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "feature-gates");
        match gates {
            Some(gates) => {
                findings.expect(gates.get("DynamicAuditing") != Some(&Value::Bool(true)), || {
                    format!(
                        "The DynamicAuditing feature gate is enabled. Config path: {}. Current featureGates: {}",
                        config_path(kubelet),
                        gates
                    )
                });
            }
            None => {
                findings.skip("featureGates does not exist in kubelet config");
            }
        }
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242399
pub fn dynamic_kubelet_config(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let gates = kubelet.lookup(&["featureGates"]);
        let value = gates.and_then(|g| g.get("DynamicKubeletConfig"));

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "feature-gates");
        findings
            .expect(gates.is_some(), || {
                format!(
                    "featureGates is not present in the kubelet configuration. Config path: {}",
                    config_path(kubelet)
                )
            })
            .expect(value == Some(&Value::Bool(false)), || {
                format!(
                    "featureGates.DynamicKubeletConfig must be present and false. Config path: {}. Current value: {}",
                    config_path(kubelet),
                    show(value)
                )
            });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242404
pub fn hostname_override(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let mut findings = Findings::new();
        findings.expect(!kubelet.has_flag("hostname-override"), || {
            format!(
                "The --hostname-override flag was found on the kubelet process. EKS nodes register \
                 with the EC2 private DNS name; accept this as a risk or add compensating controls. \
                 Current command: {}",
                kubelet.cmdline()
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242424 and V-242425
pub fn server_tls_bootstrap(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let bootstrap = kubelet.lookup(&["serverTLSBootstrap"]);
        let mut findings = Findings::new();
        findings.expect(bootstrap == Some(&Value::Bool(true)), || {
            format!(
                "Kubelet serving certificates must be bootstrapped and rotated through \
                 serverTLSBootstrap. Config path: {}. Current value: {}",
                config_path(kubelet),
                show(bootstrap)
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-245541
pub fn streaming_idle_timeout(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let timeout = kubelet.lookup(&["streamingConnectionIdleTimeout"]);

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "streaming-connection-idle-timeout");
        match timeout {
            None => {
                findings.expect(false, || {
                    format!(
                        "streamingConnectionIdleTimeout must be set to 5m or greater. Config path: {}. Current value: unset",
                        config_path(kubelet)
                    )
                });
            }
            Some(value) => match value.as_str().and_then(duration_minutes) {
                Some(minutes) => {
                    findings.expect(minutes >= MIN_STREAMING_IDLE_MINUTES, || {
                        format!(
                            "streamingConnectionIdleTimeout must be at least 5 minutes. Config path: {}. Current value: {} ({} minutes)",
                            config_path(kubelet),
                            value,
                            minutes
                        )
                    });
                }
                None => {
                    findings.skip(format!(
                        "Unable to parse streamingConnectionIdleTimeout value: {}",
                        value
                    ));
                }
            },
        }
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-254801
pub fn pod_security_gate(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        let gates = kubelet.lookup(&["featureGates"]);
        let pod_security = gates.and_then(|g| g.get("PodSecurity"));

        let mut findings = Findings::new();
        flag_absent(&mut findings, kubelet, "feature-gates");
        findings
            .expect(gates.is_some(), || {
                format!(
                    "featureGates is not present in the kubelet configuration. Config path: {}",
                    config_path(kubelet)
                )
            })
            .expect(pod_security == Some(&Value::Bool(true)), || {
                format!(
                    "featureGates.PodSecurity must be explicitly true. Config path: {}. Current featureGates: {}",
                    config_path(kubelet),
                    show(gates)
                )
            });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// V-242406
pub fn config_ownership(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        Ok(files::owned_by_root(kubelet.config_path(), "kubelet config file"))
    }
    .boxed()
}

/// V-242407 and V-242456
pub fn config_permissions(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        Ok(files::mode_at_most(kubelet.config_path(), MAX_FILE_MODE, "kubelet config file"))
    }
    .boxed()
}

/// V-242452
pub fn kubeconfig_permissions(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let kubelet = &ctx.running_kubelet()?;
        Ok(files::mode_at_most(kubelet.kubeconfig(), MAX_FILE_MODE, "kubelet kubeconfig"))
    }
    .boxed()
}

/// V-242453
pub fn kubeconfig_ownership(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        Ok(files::owned_by_root(
            Some(ctx.kubelet_kubeconfig_path()),
            "kubelet kubeconfig",
        ))
    }
    .boxed()
}

/// V-242396
pub fn kubectl_version(ctx: &CheckContext) -> CheckFuture<'_> {
    async move {
        let binary = &ctx.kubectl().options().binary;
        let path = match which::which(binary) {
            Ok(path) => path,
            Err(e) => {
                tracing::debug!("{} not found on PATH: {}", binary, e);
                return Ok(Outcome::not_applicable(
                    "kubectl is not installed on this worker node. Worker nodes run the kubelet \
                     and do not need kubectl; it belongs on administrative workstations.",
                ));
            }
        };

        let Some(version) = ctx.kubectl().client_version()? else {
            return Ok(Outcome::not_reviewed(
                "Unable to determine kubectl version from output",
            ));
        };

        let mut findings = Findings::new();
        findings.expect(version_at_least(&version, MIN_KUBECTL_VERSION), || {
            format!(
                "kubectl must be 1.12.9 or newer. Current version: {}. kubectl path: {}",
                version,
                path.display()
            )
        });
        Ok(findings.into_outcome())
    }
    .boxed()
}

/// Minutes in a Go duration string such as `4h0m0s`, `1.5h` or `500ms`
///
/// Accepts every unit Go's `time.ParseDuration` does and a bare `0`.
pub fn duration_minutes(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, mut rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if rest == "0" {
        return Some(0.0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total = 0.0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let amount: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        total += match &rest[..unit_end] {
            "h" => amount * 60.0,
            "m" => amount,
            "s" => amount / 60.0,
            "ms" => amount / 60e3,
            "us" | "\u{b5}s" | "\u{3bc}s" => amount / 60e6,
            "ns" => amount / 60e9,
            _ => return None,
        };
        rest = &rest[unit_end..];
    }

    Some(if negative { -total } else { total })
}

fn version_at_least(version: &str, min: (u32, u32, u32)) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    let current = (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    );
    current >= min
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn kubelet_with(dir: &TempDir, flags: &str, config: &str) -> CheckContext {
        let path = dir.path().join("config.json");
        fs::write(&path, config).unwrap();
        node_context(&format!("/usr/bin/kubelet {}", flags), vec![path])
    }

    fn evidence(outcome: Outcome) -> Vec<String> {
        match outcome {
            Outcome::Fail { evidence } => evidence,
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_anonymous_auth_reports_flag_and_config() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("config.yaml");
        fs::write(&cfg, r#"{"authentication":{"anonymous":{"enabled": true}}}"#).unwrap();
        let ctx = node_context(
            &format!("kubelet --config={} --anonymous-auth=false", cfg.display()),
            vec![],
        );

        let evidence = evidence(anonymous_auth(&ctx).await.unwrap());
        assert_eq!(evidence.len(), 2);
        assert!(evidence[0].contains("--anonymous-auth"));
        assert!(evidence[1].contains("Current value: true"));
    }

    #[tokio::test]
    async fn test_anonymous_auth_passes_when_disabled_in_config() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "--v=2", r#"{"authentication":{"anonymous":{"enabled":false}}}"#);
        assert_eq!(anonymous_auth(&ctx).await.unwrap(), Outcome::Pass);
    }

    #[tokio::test]
    async fn test_read_only_port() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"readOnlyPort": 0}"#);
        assert_eq!(read_only_port(&ctx).await.unwrap(), Outcome::Pass);

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"kind": "KubeletConfiguration"}"#);
        assert_eq!(read_only_port(&ctx).await.unwrap(), Outcome::Pass);

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "--read-only-port=10255", r#"{"readOnlyPort": 10255}"#);
        assert_eq!(evidence(read_only_port(&ctx).await.unwrap()).len(), 2);
    }

    #[tokio::test]
    async fn test_authorization_mode() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"authorization": {"mode": "Webhook"}}"#);
        assert_eq!(authorization_mode(&ctx).await.unwrap(), Outcome::Pass);

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"authorization": {"mode": "AlwaysAllow"}}"#);
        assert!(authorization_mode(&ctx).await.unwrap().is_fail());
    }

    #[tokio::test]
    async fn test_dynamic_auditing_without_gates_needs_review() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"readOnlyPort": 0}"#);
        assert_eq!(
            dynamic_auditing(&ctx).await.unwrap(),
            Outcome::not_reviewed("featureGates does not exist in kubelet config")
        );

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "--feature-gates=DynamicAuditing=true", "{}");
        assert!(dynamic_auditing(&ctx).await.unwrap().is_fail());
    }

    #[tokio::test]
    async fn test_feature_gate_values() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(
            &dir,
            "",
            r#"{"featureGates": {"DynamicKubeletConfig": false, "PodSecurity": true}}"#,
        );
        assert_eq!(dynamic_kubelet_config(&ctx).await.unwrap(), Outcome::Pass);
        assert_eq!(pod_security_gate(&ctx).await.unwrap(), Outcome::Pass);

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"featureGates": {"RotateKubeletServerCertificate": true}}"#);
        assert_eq!(evidence(dynamic_kubelet_config(&ctx).await.unwrap()).len(), 1);
        assert_eq!(evidence(pod_security_gate(&ctx).await.unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_idle_timeout() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"streamingConnectionIdleTimeout": "4h0m0s"}"#);
        assert_eq!(streaming_idle_timeout(&ctx).await.unwrap(), Outcome::Pass);

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"streamingConnectionIdleTimeout": "30s"}"#);
        assert!(streaming_idle_timeout(&ctx).await.unwrap().is_fail());

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"streamingConnectionIdleTimeout": "1.5h"}"#);
        assert_eq!(streaming_idle_timeout(&ctx).await.unwrap(), Outcome::Pass);

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"streamingConnectionIdleTimeout": "0"}"#);
        assert!(streaming_idle_timeout(&ctx).await.unwrap().is_fail());

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", r#"{"streamingConnectionIdleTimeout": "forever"}"#);
        assert!(matches!(
            streaming_idle_timeout(&ctx).await.unwrap(),
            Outcome::NotReviewed { .. }
        ));

        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(&dir, "", "{}");
        assert!(streaming_idle_timeout(&ctx).await.unwrap().is_fail());
    }

    #[tokio::test]
    async fn test_static_pods_and_hostname_override() {
        let dir = TempDir::new().unwrap();
        let ctx = kubelet_with(
            &dir,
            "--hostname-override=ip-10-0-0-1.ec2.internal",
            r#"{"staticPodPath": "/etc/kubernetes/manifests", "serverTLSBootstrap": true}"#,
        );
        assert!(static_pod_path(&ctx).await.unwrap().is_fail());
        assert!(hostname_override(&ctx).await.unwrap().is_fail());
        assert_eq!(server_tls_bootstrap(&ctx).await.unwrap(), Outcome::Pass);
    }

    #[tokio::test]
    async fn test_missing_kubelet_is_an_error() {
        let ctx = node_context("", vec![PathBuf::from("/nonexistent/config.json")]);
        assert!(matches!(
            read_only_port(&ctx).await,
            Err(ControlError::KubeletNotRunning)
        ));
    }

    #[test]
    fn test_duration_minutes() {
        assert_eq!(duration_minutes("5m"), Some(5.0));
        assert_eq!(duration_minutes("1h30m"), Some(90.0));
        assert_eq!(duration_minutes("4h0m0s"), Some(240.0));
        assert_eq!(duration_minutes("300s"), Some(5.0));
        assert_eq!(duration_minutes("1.5h"), Some(90.0));
        assert_eq!(duration_minutes("0"), Some(0.0));
        assert_eq!(duration_minutes("30000ms"), Some(0.5));
        assert_eq!(duration_minutes("-5m"), Some(-5.0));
        assert!(duration_minutes("500ms").is_some_and(|m| m < 0.01));
        assert!(duration_minutes("90us").is_some_and(|m| m > 0.0 && m < 0.01));
        assert_eq!(duration_minutes("5"), None);
        assert_eq!(duration_minutes("5d"), None);
        assert_eq!(duration_minutes("h"), None);
        assert_eq!(duration_minutes(""), None);
    }

    #[test]
    fn test_version_at_least() {
        assert!(version_at_least("1.12.9", MIN_KUBECTL_VERSION));
        assert!(version_at_least("1.30.2", MIN_KUBECTL_VERSION));
        assert!(version_at_least("2.0.0", MIN_KUBECTL_VERSION));
        assert!(!version_at_least("1.12.8", MIN_KUBECTL_VERSION));
        assert!(!version_at_least("1.9.11", MIN_KUBECTL_VERSION));
    }
}
