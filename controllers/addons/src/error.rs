//! Add-on layer error types.

use hcloud_client::HcloudError;
use resource_graph::GraphError;
use thiserror::Error;

/// Errors that can occur while declaring cluster add-ons.
#[derive(Debug, Error)]
pub enum AddonError {
    /// Resource graph construction or evaluation error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Hetzner Cloud API error
    #[error("Hetzner Cloud error: {0}")]
    Hcloud(#[from] HcloudError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The published kubeconfig could not be loaded
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(String),

    /// A manifest is missing its type or name
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// helm exited unsuccessfully
    #[error("helm {command} failed: {message}")]
    Helm { command: String, message: String },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (temporary files, helm process)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML error (helm values, kubeconfig)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
