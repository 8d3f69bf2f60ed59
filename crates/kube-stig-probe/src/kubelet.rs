//! Kubelet introspection
//!
//! Finds the running kubelet, parses its flags, locates its config file and
//! exposes nested lookups over the loaded config. Every [`Kubelet`] is a
//! snapshot of the process table and filesystem taken at construction time.

use crate::flags::ProcessFlags;
use crate::platform::{self, Platform};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Executable name of the kubelet agent
pub const KUBELET_PROCESS: &str = "kubelet";

/// Snapshot of the local kubelet's flags and config file
#[derive(Debug, Clone)]
pub struct Kubelet {
    cmdline: String,
    flags: ProcessFlags,
    config_path: Option<String>,
    config: Value,
    client_ca_file: Option<String>,
    kubeconfig: Option<String>,
}

impl Kubelet {
    /// Inspect the kubelet on this host
    pub fn discover() -> Self {
        Self::discover_with(platform::detect().as_ref())
    }

    /// Inspect the kubelet using the given platform conventions
    pub fn discover_with(platform: &dyn Platform) -> Self {
        let cmdline = platform.command_line(KUBELET_PROCESS);
        Self::from_command_line(cmdline, platform)
    }

    /// Build from an already captured command line
    pub fn from_command_line(cmdline: String, platform: &dyn Platform) -> Self {
        let flags = ProcessFlags::parse(&cmdline);
        let config_path = discover_config_path(&flags, platform);
        let config = config_path
            .as_deref()
            .map(|p| load_config(Path::new(p)))
            .unwrap_or_else(empty_document);

        let client_ca_file = lookup_in(&config, &["authentication", "x509", "clientCAFile"])
            .and_then(Value::as_str)
            .map(|p| platform.normalize_path(p));
        let kubeconfig = flags.get("kubeconfig").map(|p| platform.normalize_path(p));

        match &config_path {
            Some(path) => tracing::debug!("Kubelet config file: {}", path),
            None => tracing::debug!("No kubelet config file found"),
        }

        Self {
            cmdline,
            flags,
            config_path,
            config,
            client_ca_file,
            kubeconfig,
        }
    }

    /// Raw command line of the kubelet process (empty if not running)
    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    pub fn is_running(&self) -> bool {
        !self.cmdline.is_empty()
    }

    pub fn flags(&self) -> &ProcessFlags {
        &self.flags
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    /// Path of the config file in use, if one was found
    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    /// Whether the config path points at an existing, non-empty file
    pub fn config_file_exists(&self) -> bool {
        self.config_path
            .as_deref()
            .is_some_and(|p| is_non_empty_file(Path::new(p)))
    }

    /// The loaded config document (an empty mapping when none was loaded)
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Walk the config document by successive keys
    ///
    /// Returns `None` as soon as a key is missing or the current node is not
    /// a mapping.
    pub fn lookup<K: AsRef<str>>(&self, path: &[K]) -> Option<&Value> {
        lookup_in(&self.config, path)
    }

    /// `authentication.x509.clientCAFile`, normalized for the host
    pub fn client_ca_file(&self) -> Option<&str> {
        self.client_ca_file.as_deref()
    }

    /// Value of the `--kubeconfig` flag, normalized for the host
    pub fn kubeconfig(&self) -> Option<&str> {
        self.kubeconfig.as_deref()
    }
}

/// Resolve the config file: `--config` wins, then the first existing, non-empty candidate
pub fn discover_config_path(flags: &ProcessFlags, platform: &dyn Platform) -> Option<String> {
    let path = match flags.get("config") {
        Some(explicit) => Some(explicit.to_string()),
        None => platform
            .config_candidates()
            .into_iter()
            .find(|p| is_non_empty_file(p))
            .map(|p| p.to_string_lossy().into_owned()),
    };
    path.map(|p| platform.normalize_path(&p))
}

/// Load a JSON or YAML config document
///
/// A missing, empty, unreadable or unparsable file yields an empty mapping.
pub fn load_config(path: &Path) -> Value {
    if !is_non_empty_file(path) {
        return empty_document();
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", path.display(), e);
            return empty_document();
        }
    };

    let parsed = match serde_json::from_str::<Value>(&text) {
        Ok(doc) => Ok(doc),
        Err(_) => serde_yaml::from_str::<Value>(&text),
    };

    match parsed {
        Ok(doc @ Value::Object(_)) => doc,
        Ok(_) => {
            tracing::warn!("{} is not a mapping; ignoring it", path.display());
            empty_document()
        }
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            empty_document()
        }
    }
}

/// Nested lookup over any document
pub fn lookup_in<'a, K: AsRef<str>>(doc: &'a Value, path: &[K]) -> Option<&'a Value> {
    path.iter()
        .try_fold(doc, |node, key| node.as_object()?.get(key.as_ref()))
}

fn is_non_empty_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}

fn empty_document() -> Value {
    Value::Object(Map::new())
}
