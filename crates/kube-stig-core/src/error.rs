//! Error types for kube-stig-core

use thiserror::Error;

/// Errors raised while reading run configuration
#[derive(Error, Debug)]
pub enum CoreError {
    /// Scope was neither "cluster" nor "node"
    #[error("Invalid run scope '{0}': expected 'cluster' or 'node'")]
    InvalidScope(String),

    /// Failed to parse the inputs file
    #[error("Failed to parse inputs file {path}: {source}")]
    Inputs {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
