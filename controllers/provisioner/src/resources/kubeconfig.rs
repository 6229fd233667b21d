//! Admin kubeconfig retrieval

use super::{decode, SharedMachineApi};
use crate::identity::ClusterSecrets;
use resource_graph::{GraphError, ProviderError, Resolved, Resource, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use talos_client::ClientConfiguration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KubeconfigInputs {
    endpoint: String,
    node: String,
    client_configuration: ClientConfiguration,
}

/// Fetches the admin kubeconfig from the bootstrapped node through the
/// control-plane load balancer. Fetched again only when the endpoint, node
/// or credentials change.
pub struct KubeconfigResource {
    talos: SharedMachineApi,
    load_balancer: ResourceId,
    node: ResourceId,
    secrets: ResourceId,
    bootstrap: ResourceId,
}

impl KubeconfigResource {
    pub fn new(
        talos: SharedMachineApi,
        load_balancer: ResourceId,
        node: ResourceId,
        secrets: ResourceId,
        bootstrap: ResourceId,
    ) -> Self {
        Self {
            talos,
            load_balancer,
            node,
            secrets,
            bootstrap,
        }
    }

    pub fn dependencies(&self) -> [ResourceId; 4] {
        [
            self.load_balancer.clone(),
            self.node.clone(),
            self.secrets.clone(),
            self.bootstrap.clone(),
        ]
    }
}

#[async_trait::async_trait]
impl Resource for KubeconfigResource {
    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        // Only ordering matters here
        upstream.output(&self.bootstrap)?;
        let secrets: ClusterSecrets = upstream.typed(&self.secrets)?;
        let inputs = KubeconfigInputs {
            endpoint: upstream.string(&self.load_balancer, "/ipv4")?,
            node: upstream.string(&self.node, "/ipv4")?,
            client_configuration: secrets.client,
        };
        Ok(serde_json::to_value(inputs)?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        let inputs: KubeconfigInputs = decode(inputs)?;
        info!("Fetching kubeconfig from {} via {}", inputs.node, inputs.endpoint);
        let kubeconfig = self
            .talos
            .kubeconfig(&inputs.client_configuration, &inputs.endpoint, &inputs.node)
            .await?;
        Ok(json!({"kubeconfig": kubeconfig}))
    }
}
