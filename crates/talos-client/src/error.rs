//! Talos client errors

use thiserror::Error;

/// Errors that can occur when talking to the Talos management plane
#[derive(Debug, Error)]
pub enum TalosError {
    /// Spawning talosctl or handling its temporary files failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// talosctl exited unsuccessfully; stderr is carried verbatim
    #[error("{command} failed: {message}")]
    CommandFailed { command: String, message: String },

    /// The node could not be reached
    #[error("Node {node} unreachable: {message}")]
    Unreachable { node: String, message: String },

    /// etcd on the node was already bootstrapped
    #[error("Node {0} is already bootstrapped")]
    AlreadyBootstrapped(String),

    /// talosconfig could not be rendered
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// Invalid input (e.g. empty node address)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TalosError {
    /// Whether the failure happened before the node processed the request
    pub fn is_transport(&self) -> bool {
        matches!(self, TalosError::Unreachable { .. })
    }
}
