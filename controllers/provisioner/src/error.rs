//! Provisioner error types.

use hcloud_client::HcloudError;
use resource_graph::GraphError;
use talos_client::TalosError;
use thiserror::Error;

/// Errors that can occur in the cluster provisioner.
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// Resource graph construction or evaluation error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Hetzner Cloud API error
    #[error("Hetzner Cloud error: {0}")]
    Hcloud(#[from] HcloudError),

    /// Talos management-plane error
    #[error("Talos error: {0}")]
    Talos(#[from] TalosError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cluster identity could not be generated
    #[error("Identity generation failed: {0}")]
    Identity(String),

    /// Machine configuration could not be rendered
    #[error("Machine configuration error: {0}")]
    MachineConfig(String),

    /// Probe/metrics server failure
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// Metrics registry failure
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<rcgen::Error> for ProvisionerError {
    fn from(e: rcgen::Error) -> Self {
        ProvisionerError::Identity(e.to_string())
    }
}

impl From<serde_yaml::Error> for ProvisionerError {
    fn from(e: serde_yaml::Error) -> Self {
        ProvisionerError::MachineConfig(e.to_string())
    }
}
