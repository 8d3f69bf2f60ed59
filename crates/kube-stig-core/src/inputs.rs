//! Profile inputs file

use crate::error::CoreError;
use crate::types::RunScope;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Values read from a YAML inputs file
///
/// Every key is optional; command-line values take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Inputs {
    pub run_scope: Option<RunScope>,
    pub cluster_name: Option<String>,
    pub region: Option<String>,
    pub kubeconfig: Option<String>,
    pub context: Option<String>,
    pub kubelet_kubeconfig_path: Option<String>,
}

impl Inputs {
    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text).map_err(|source| CoreError::Inputs {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}
