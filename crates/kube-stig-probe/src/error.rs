//! Error types for kube-stig-probe

use thiserror::Error;

/// Errors that can occur while probing a node or a cluster
///
/// Absence of data (an unset flag, a missing config file, a resource that
/// does not exist) is never an error; those surface as `None` or empty values.
/// An unreachable API server is always an error.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The executable could not be started at all
    #[error("Failed to execute {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The subcommand string could not be split into arguments
    #[error("Invalid command line '{command}': {source}")]
    CommandSplit {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    /// kubectl ran but exited non-zero
    ///
    /// `message` is the classified text from [`KubectlOutput::error_message`].
    ///
    /// [`KubectlOutput::error_message`]: crate::kubectl::KubectlOutput::error_message
    #[error("{message}")]
    Kubectl { message: String, connectivity: bool },

    /// kubectl succeeded but its output was not the JSON that was asked for
    #[error("kubectl output could not be parsed as JSON")]
    UnparsableOutput { command: String },

    /// Failed to parse JSON
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Whether kubectl failed because the API server could not be reached
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ProbeError::Kubectl { connectivity: true, .. })
    }
}
