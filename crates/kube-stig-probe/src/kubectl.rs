//! Kubectl command execution
//!
//! Runs kubectl with optional kubeconfig, context and namespace, and gives
//! callers structured, tabular and classified-error views over one captured
//! result. kubectl is always started directly with an argument vector; the
//! shell-quoted form from [`Kubectl::command_line`] is only for display.

use crate::error::ProbeError;
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use serde_json::Value;
use std::process::Command;

/// Message reported when kubectl cannot reach the API server
pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to connect to Kubernetes cluster. Verify cluster access and kubeconfig.";

/// stderr fragments that mean the control plane is unreachable
const CONNECTIVITY_PATTERNS: &[&str] = &[
    "Unable to connect to the server",
    "connection refused",
    "no such host",
    "dial tcp",
    "context deadline exceeded",
    "i/o timeout",
];

/// Global kubectl options applied to every invocation
#[derive(Debug, Clone)]
pub struct KubectlOptions {
    /// Executable to run
    pub binary: String,
    pub kubeconfig: Option<String>,
    pub context: Option<String>,
    pub namespace: Option<String>,
}

impl Default for KubectlOptions {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            kubeconfig: None,
            context: None,
            namespace: None,
        }
    }
}

impl KubectlOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<String>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Global flags, without the executable
    fn global_args(&self, namespace: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.clone());
        }
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(namespace) = namespace.or(self.namespace.as_deref()) {
            args.push("-n".to_string());
            args.push(namespace.to_string());
        }
        args
    }
}

/// Runs an external program to completion
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<KubectlOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<KubectlOutput> {
        (**self).run(program, args)
    }
}

/// Runs programs as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> std::io::Result<KubectlOutput> {
        let output = Command::new(program).args(args).output()?;
        Ok(KubectlOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            // Killed by a signal
            exit_status: output.status.code().unwrap_or(-1),
        })
    }
}

/// Captured result of one kubectl invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KubectlOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// Column headers and rows of kubectl's default table output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl KubectlOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// stdout parsed as JSON, or `None` if it is not valid JSON
    pub fn structured(&self) -> Option<Value> {
        serde_json::from_str(&self.stdout).ok()
    }

    /// stdout parsed as YAML, for callers that asked for `-o yaml`
    pub fn structured_yaml(&self) -> Option<Value> {
        serde_yaml::from_str(&self.stdout).ok()
    }

    /// The `items` array of a JSON list response (empty if absent)
    pub fn items(&self) -> Vec<Value> {
        match self.structured() {
            Some(Value::Object(mut map)) => match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Parse whitespace-aligned table output
    ///
    /// The last column keeps any embedded whitespace.
    pub fn tabular(&self) -> Table {
        let mut lines = self
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty());

        let Some(header_line) = lines.next() else {
            return Table::default();
        };

        let headers: Vec<String> = header_line.split_whitespace().map(str::to_string).collect();
        let rows = lines.map(|line| split_fields(line, headers.len())).collect();

        Table { headers, rows }
    }

    /// Whether stderr says the API server could not be reached
    pub fn is_connectivity_error(&self) -> bool {
        CONNECTIVITY_PATTERNS
            .iter()
            .any(|pattern| self.stderr.contains(pattern))
    }

    /// Human-readable failure, `None` on success
    pub fn error_message(&self) -> Option<String> {
        if self.success() {
            return None;
        }
        if self.is_connectivity_error() {
            Some(CONNECTIVITY_MESSAGE.to_string())
        } else {
            Some(self.stderr.trim().to_string())
        }
    }
}

/// Split a line into at most `max` whitespace-separated fields
fn split_fields(line: &str, max: usize) -> Vec<String> {
    let mut fields = Vec::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        if fields.len() + 1 >= max.max(1) {
            fields.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest.to_string());
                break;
            }
        }
    }

    fields
}

/// A container that pulls secret material into its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretEnvReference {
    pub pod: String,
    pub namespace: String,
    pub container: String,
}

/// Kubectl client bound to one set of global options
#[derive(Debug, Clone)]
pub struct Kubectl<R = SystemRunner> {
    options: KubectlOptions,
    runner: R,
}

impl Kubectl<SystemRunner> {
    pub fn new(options: KubectlOptions) -> Self {
        Self {
            options,
            runner: SystemRunner,
        }
    }
}

impl<R: CommandRunner> Kubectl<R> {
    pub fn with_runner(options: KubectlOptions, runner: R) -> Self {
        Self { options, runner }
    }

    pub fn options(&self) -> &KubectlOptions {
        &self.options
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Full argument vector for a subcommand string such as `get pods -A -o json`
    pub fn args_for(&self, subcommand: &str) -> Result<Vec<String>, ProbeError> {
        let mut args = self.options.global_args(None);
        args.extend(split_subcommand(subcommand)?);
        Ok(args)
    }

    /// Shell-safe rendering of the invocation, for logs and reports
    pub fn command_line(&self, subcommand: &str) -> Result<String, ProbeError> {
        let mut words = vec![self.options.binary.clone()];
        words.extend(self.args_for(subcommand)?);
        Ok(shell_words::join(words))
    }

    /// Run one kubectl subcommand
    ///
    /// A non-zero exit status is returned as data; only a failure to start
    /// kubectl at all is an error.
    pub fn execute(&self, subcommand: &str) -> Result<KubectlOutput, ProbeError> {
        let words = split_subcommand(subcommand)?;
        self.run(None, words)
    }

    /// Names of all namespaces
    pub fn namespaces(&self) -> Result<Vec<String>, ProbeError> {
        let items = self.list_words(None, words(&["get", "namespaces", "-o", "json"]))?;
        Ok(items
            .iter()
            .filter_map(|ns| ns.pointer("/metadata/name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    /// All objects of a kind, in one namespace or across all namespaces
    pub fn resources(&self, kind: &str, namespace: Option<&str>) -> Result<Vec<Value>, ProbeError> {
        match namespace {
            Some(ns) => self.list_words(Some(ns), words(&["get", kind, "-o", "json"])),
            None => self.list_words(None, words(&["get", kind, "--all-namespaces", "-o", "json"])),
        }
    }

    /// Items of a JSON list subcommand such as `get pods -A -l app=web -o json`
    ///
    /// A non-zero exit is [`ProbeError::Kubectl`], output that is not JSON is
    /// [`ProbeError::UnparsableOutput`]. An empty listing is `Ok` and empty.
    pub fn list(&self, subcommand: &str) -> Result<Vec<Value>, ProbeError> {
        self.list_words(None, split_subcommand(subcommand)?)
    }

    /// Whether a named object exists
    pub fn resource_exists(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<bool, ProbeError> {
        let output = self.run(
            namespace,
            words(&["get", kind, name, "--ignore-not-found", "-o", "name"]),
        )?;
        if !output.success() {
            return Err(failure(&output));
        }
        Ok(!output.stdout.trim().is_empty())
    }

    /// All pods, typed
    ///
    /// A pod that does not decode is an error rather than a pod with nothing
    /// to report.
    pub fn pods(&self) -> Result<Vec<Pod>, ProbeError> {
        self.resources("pods", None)?
            .into_iter()
            .map(|item| serde_json::from_value::<Pod>(item).map_err(ProbeError::from))
            .collect()
    }

    /// Containers that read secrets through environment variables
    pub fn pods_with_secret_env_vars(&self) -> Result<Vec<SecretEnvReference>, ProbeError> {
        Ok(secret_env_references(&self.pods()?))
    }

    /// Client version as `major.minor.patch`, if kubectl reports one
    pub fn client_version(&self) -> Result<Option<String>, ProbeError> {
        let json = self.run(None, vec!["version".into(), "--client".into(), "-o".into(), "json".into()])?;
        if json.success() {
            if let Some(version) = parse_client_version(&json.stdout) {
                return Ok(Some(version));
            }
        }
        let text = self.run(None, vec!["version".into(), "--client".into()])?;
        Ok(parse_client_version(&text.stdout))
    }

    fn list_words(&self, namespace: Option<&str>, words: Vec<String>) -> Result<Vec<Value>, ProbeError> {
        let command = words.join(" ");
        let output = self.run(namespace, words)?;
        if !output.success() {
            let err = failure(&output);
            tracing::warn!("kubectl {} failed: {}", command, err);
            return Err(err);
        }
        if output.structured().is_none() {
            tracing::warn!("kubectl {} returned output that is not JSON", command);
            return Err(ProbeError::UnparsableOutput { command });
        }
        Ok(output.items())
    }

    fn run(&self, namespace: Option<&str>, words: Vec<String>) -> Result<KubectlOutput, ProbeError> {
        let mut args = self.options.global_args(namespace);
        args.extend(words);

        let mut shown = vec![self.options.binary.clone()];
        shown.extend(args.iter().cloned());
        tracing::debug!("Executing: {}", shell_words::join(&shown));

        let output = self
            .runner
            .run(&self.options.binary, &args)
            .map_err(|source| ProbeError::Spawn {
                program: self.options.binary.clone(),
                source,
            })?;

        tracing::debug!("kubectl exited with status {}", output.exit_status);
        Ok(output)
    }
}

fn words(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|w| w.to_string()).collect()
}

/// Error for a kubectl run that exited non-zero
fn failure(output: &KubectlOutput) -> ProbeError {
    ProbeError::Kubectl {
        message: output
            .error_message()
            .unwrap_or_else(|| format!("kubectl exited with status {}", output.exit_status)),
        connectivity: output.is_connectivity_error(),
    }
}

fn split_subcommand(subcommand: &str) -> Result<Vec<String>, ProbeError> {
    shell_words::split(subcommand).map_err(|source| ProbeError::CommandSplit {
        command: subcommand.to_string(),
        source,
    })
}

/// Find containers with `env[].valueFrom.secretKeyRef` or `envFrom[].secretRef`
pub fn secret_env_references(pods: &[Pod]) -> Vec<SecretEnvReference> {
    let mut found = Vec::new();

    for pod in pods {
        let Some(spec) = &pod.spec else { continue };
        let name = pod.metadata.name.clone().unwrap_or_default();
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();

        let containers = spec
            .init_containers
            .iter()
            .flatten()
            .chain(spec.containers.iter());

        for container in containers {
            let secret_env = container.env.iter().flatten().any(|env| {
                env.value_from
                    .as_ref()
                    .is_some_and(|source| source.secret_key_ref.is_some())
            });
            let secret_env_from = container
                .env_from
                .iter()
                .flatten()
                .any(|source| source.secret_ref.is_some());

            if secret_env || secret_env_from {
                found.push(SecretEnvReference {
                    pod: name.clone(),
                    namespace: namespace.clone(),
                    container: container.name.clone(),
                });
            }
        }
    }

    found
}

/// Extract `X.Y.Z` from `kubectl version --client` output (JSON or text)
pub fn parse_client_version(output: &str) -> Option<String> {
    let from_json = serde_json::from_str::<Value>(output)
        .ok()
        .and_then(|v| v.pointer("/clientVersion/gitVersion")?.as_str().map(str::to_string));

    let raw = from_json.or_else(|| {
        output
            .lines()
            .find_map(|line| line.trim().strip_prefix("Client Version:"))
            .map(|v| v.trim().to_string())
    })?;

    let version = raw.trim_start_matches('v');
    let core: String = version
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() >= 3 && parts[..3].iter().all(|p| !p.is_empty()) {
        Some(parts[..3].join("."))
    } else {
        None
    }
}
