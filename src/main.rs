//! kube-stig: Kubernetes STIG checks for worker nodes and EKS clusters

use clap::{Parser, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use kube_stig_controls::context::DEFAULT_KUBELET_KUBECONFIG;
use kube_stig_controls::{CheckContext, catalog, run_controls, select};
use kube_stig_core::{Inputs, Report, RunScope};
use kube_stig_probe::{EksApi, KubectlOptions};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{EnvFilter, prelude::*};

/// kube-stig: Kubernetes STIG compliance checks
#[derive(Parser, Debug)]
#[command(name = "kube-stig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Run scope: cluster (API checks) or node (kubelet checks)
    #[arg(short, long, env = "RUN_SCOPE")]
    scope: Option<RunScope>,

    /// EKS cluster name
    #[arg(long, env = "EKS_CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// AWS region of the cluster (default: from the AWS config chain)
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// kubeconfig passed to kubectl
    #[arg(long)]
    kubeconfig: Option<String>,

    /// kubeconfig context passed to kubectl
    #[arg(long)]
    context: Option<String>,

    /// Path of the kubelet's own kubeconfig (default: /var/lib/kubelet/kubeconfig)
    #[arg(long)]
    kubelet_kubeconfig: Option<String>,

    /// YAML inputs file; command-line values take precedence
    #[arg(short, long)]
    inputs: Option<PathBuf>,

    /// Run only these controls (repeatable)
    #[arg(long = "control", value_name = "ID")]
    controls: Vec<String>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log to a file instead of stderr (default when given without a path: <temp_dir>/kube-stig.log)
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    log_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Run configuration after merging the command line over the inputs file
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    scope: RunScope,
    cluster_name: Option<String>,
    region: Option<String>,
    kubeconfig: Option<String>,
    context: Option<String>,
    kubelet_kubeconfig: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize error handling
    color_eyre::install()?;

    init_logging(cli.debug, cli.log_file.as_deref())?;
    tracing::info!("Starting kube-stig");

    let inputs = match &cli.inputs {
        Some(path) => Inputs::from_file(path)?,
        None => Inputs::default(),
    };
    let settings = resolve_settings(&cli, inputs)?;
    tracing::info!("Run scope: {}", settings.scope);
    if let Some(name) = &settings.cluster_name {
        tracing::info!("Cluster: {}", name);
    }

    let controls = select(catalog(), &cli.controls)?;
    let ctx = build_context(&settings).await;

    let reports = run_controls(&controls, &ctx).await;
    let report = Report::new(settings.scope, settings.cluster_name.clone(), reports);

    match cli.format {
        Format::Text => print!("{}", render_text(&report)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    tracing::info!(
        "Finished: {} passed, {} failed, {} errors",
        report.summary.passed,
        report.summary.failed,
        report.summary.errors
    );
    if report.has_findings() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(debug: bool, log_file: Option<&str>) -> Result<()> {
    // Build filter: set base level, but quiet down noisy HTTP/AWS libraries
    let filter = if debug {
        EnvFilter::from_default_env()
            .add_directive(Level::DEBUG.into())
            .add_directive("hyper=info".parse()?)
            .add_directive("aws_smithy_runtime=info".parse()?)
            .add_directive("aws_config=info".parse()?)
            .add_directive("rustls=info".parse()?)
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let registry = tracing_subscriber::registry().with(filter);
    match resolve_log_path(log_file) {
        Some(path) => {
            let file = File::create(&path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_target(false),
                )
                .init();
        }
        None => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .init();
        }
    }
    Ok(())
}

/// Resolve the log file path: `None` logs to stderr, an empty path falls back to the temp directory.
fn resolve_log_path(log_file: Option<&str>) -> Option<PathBuf> {
    match log_file {
        None => None,
        Some("") => Some(std::env::temp_dir().join("kube-stig.log")),
        Some(path) => Some(PathBuf::from(path)),
    }
}

fn resolve_settings(cli: &Cli, inputs: Inputs) -> Result<Settings> {
    let scope = cli
        .scope
        .or(inputs.run_scope)
        .ok_or_else(|| eyre!("A run scope is required: pass --scope, set RUN_SCOPE or add run_scope to the inputs file"))?;

    Ok(Settings {
        scope,
        cluster_name: cli.cluster_name.clone().or(inputs.cluster_name),
        region: cli.region.clone().or(inputs.region),
        kubeconfig: cli.kubeconfig.clone().or(inputs.kubeconfig),
        context: cli.context.clone().or(inputs.context),
        kubelet_kubeconfig: cli
            .kubelet_kubeconfig
            .clone()
            .or(inputs.kubelet_kubeconfig_path)
            .unwrap_or_else(|| DEFAULT_KUBELET_KUBECONFIG.to_string()),
    })
}

async fn build_context(settings: &Settings) -> CheckContext {
    let mut options = KubectlOptions::new();
    if let Some(kubeconfig) = &settings.kubeconfig {
        options = options.with_kubeconfig(kubeconfig);
    }
    if let Some(context) = &settings.context {
        options = options.with_context(context);
    }

    let mut ctx = CheckContext::new(settings.scope)
        .with_kubectl_options(options)
        .with_kubelet_kubeconfig_path(&settings.kubelet_kubeconfig);

    if let Some(name) = &settings.cluster_name {
        ctx = ctx.with_cluster_name(name);
        if settings.scope.is_cluster() {
            let api = EksApi::from_env(settings.region.as_deref()).await;
            ctx = ctx.with_cluster_api(Arc::new(api));
        }
    }
    ctx
}

fn render_text(report: &Report) -> String {
    let mut out = format!(
        "kube-stig report ({}{})\n\n",
        report.scope.pass_label(),
        report
            .cluster_name
            .as_deref()
            .map(|name| format!(", cluster {}", name))
            .unwrap_or_default()
    );

    for control in &report.controls {
        out.push_str(&format!(
            "{} {:<12} {} [{}] {}\n",
            control.outcome.symbol(),
            control.outcome.label(),
            control.id,
            control.severity.category(),
            control.title
        ));
        for detail in control.outcome.details() {
            for line in detail.lines() {
                out.push_str(&format!("      {}\n", line));
            }
        }
    }

    let s = &report.summary;
    out.push_str(&format!(
        "\n{} controls: {} passed, {} failed, {} not applicable, {} not reviewed, {} errors\n",
        s.total, s.passed, s.failed, s.not_applicable, s.not_reviewed, s.errors
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_stig_core::{ControlReport, Outcome, Severity};

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["kube-stig"];
        argv.extend(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn default_log_path_uses_temp_dir() {
        let path = resolve_log_path(Some(""));
        let expected = std::env::temp_dir().join("kube-stig.log");
        assert_eq!(path, Some(expected));
    }

    #[test]
    fn no_log_file_logs_to_stderr() {
        assert_eq!(resolve_log_path(None), None);
    }

    #[test]
    fn explicit_log_path_is_used() {
        let path = resolve_log_path(Some("/some/custom/path.log"));
        assert_eq!(path, Some(PathBuf::from("/some/custom/path.log")));
    }

    #[test]
    fn scope_parses_case_insensitively() {
        assert_eq!(cli(&["--scope", "NODE"]).scope, Some(RunScope::Node));
        assert!(Cli::try_parse_from(["kube-stig", "--scope", "everywhere"]).is_err());
    }

    #[test]
    fn command_line_overrides_inputs() {
        let inputs = Inputs {
            run_scope: Some(RunScope::Node),
            cluster_name: Some("from-file".to_string()),
            context: Some("admin@demo".to_string()),
            kubelet_kubeconfig_path: Some("/etc/kubernetes/kubelet.conf".to_string()),
            ..Default::default()
        };
        let settings = resolve_settings(
            &cli(&["--scope", "cluster", "--cluster-name", "demo"]),
            inputs,
        )
        .unwrap();

        assert_eq!(settings.scope, RunScope::Cluster);
        assert_eq!(settings.cluster_name.as_deref(), Some("demo"));
        assert_eq!(settings.context.as_deref(), Some("admin@demo"));
        assert_eq!(settings.kubelet_kubeconfig, "/etc/kubernetes/kubelet.conf");
    }

    #[test]
    fn scope_is_required() {
        let cli = Cli {
            scope: None,
            ..cli(&[])
        };
        assert!(resolve_settings(&cli, Inputs::default()).is_err());
    }

    #[test]
    fn kubelet_kubeconfig_default() {
        let settings = resolve_settings(&cli(&["--scope", "node"]), Inputs::default()).unwrap();
        assert_eq!(settings.kubelet_kubeconfig, DEFAULT_KUBELET_KUBECONFIG);
    }

    #[test]
    fn text_report_lists_evidence() {
        let report = Report::new(
            RunScope::Node,
            None,
            vec![ControlReport {
                id: "V-242391".to_string(),
                title: "The Kubernetes Kubelet must have anonymous authentication disabled.".to_string(),
                severity: Severity::High,
                outcome: Outcome::Fail {
                    evidence: vec!["flag present".to_string(), "config says true".to_string()],
                },
            }],
        );
        let text = render_text(&report);
        assert!(text.starts_with("kube-stig report (node pass)\n"));
        assert!(text.contains("V-242391 [CAT I]"));
        assert!(text.contains("      flag present\n      config says true\n"));
        assert!(text.contains("1 controls: 0 passed, 1 failed"));
    }
}
