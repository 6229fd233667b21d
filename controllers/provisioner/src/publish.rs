//! Published outputs of the provisioning graph
//!
//! After a converged evaluation the cloud token, the talosconfig, the admin
//! kubeconfig and the API endpoint are written to the outputs file, where
//! the add-on layer reads them.

use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;
use crate::identity::ClusterSecrets;
use crate::machine_config::control_plane_endpoint;
use crate::pipeline::PipelineIds;
use crate::resources::LoadBalancerOutputs;
use resource_graph::{GraphError, GraphState, Outputs, ResourceId};
use serde::de::DeserializeOwned;
use talos_client::TalosConfig;

pub const HCLOUD_TOKEN: &str = "hcloud_token";
pub const TALOSCONFIG: &str = "talosconfig";
pub const KUBECONFIG: &str = "kubeconfig";
pub const CONTROL_PLANE_ENDPOINT: &str = "control_plane_endpoint";

fn recorded<T: DeserializeOwned>(state: &GraphState, id: &ResourceId) -> Result<T, ProvisionerError> {
    let record = state
        .get(id)
        .ok_or_else(|| GraphError::State(format!("{} has not been applied", id)))?;
    serde_json::from_value(record.outputs.clone())
        .map_err(|e| GraphError::State(format!("cannot decode outputs of {}: {}", id, e)).into())
}

/// Outputs derived from the recorded state of a converged graph
pub fn collect(config: &ProvisionerConfig, ids: &PipelineIds, state: &GraphState) -> Result<Outputs, ProvisionerError> {
    let load_balancer: LoadBalancerOutputs = recorded(state, &ids.load_balancer)?;
    let secrets: ClusterSecrets = recorded(state, &ids.secrets)?;
    let kubeconfig: serde_json::Value = recorded(state, &ids.kubeconfig)?;
    let kubeconfig = kubeconfig
        .get("kubeconfig")
        .and_then(|k| k.as_str())
        .ok_or_else(|| GraphError::State(format!("{} has no kubeconfig", ids.kubeconfig)))?;

    let talosconfig = TalosConfig::new(
        &config.cluster_name,
        secrets.client_configuration(),
        vec![load_balancer.ipv4.clone()],
        Vec::new(),
    )
    .to_yaml()?;

    let mut outputs = Outputs::new();
    outputs
        .set(HCLOUD_TOKEN, config.hcloud_token.clone())
        .set(TALOSCONFIG, talosconfig)
        .set(KUBECONFIG, kubeconfig)
        .set(CONTROL_PLANE_ENDPOINT, control_plane_endpoint(&load_balancer.ipv4));
    Ok(outputs)
}

/// Merge `outputs` into the outputs file, keeping values other layers wrote
pub fn publish(config: &ProvisionerConfig, outputs: Outputs) -> Result<(), ProvisionerError> {
    let mut published = Outputs::load_or_default(&config.outputs_file)?;
    published.merge(outputs);
    published.save(&config.outputs_file)?;
    tracing::info!("Published outputs to {}", config.outputs_file.display());
    Ok(())
}
