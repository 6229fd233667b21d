//! Configuration-apply provider

use super::{decode, SharedMachineApi};
use crate::identity::ClusterSecrets;
use resource_graph::{GraphError, ProviderError, Resolved, Resource, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use talos_client::ClientConfiguration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyInputs {
    node: String,
    machine_config: String,
    client_configuration: ClientConfiguration,
}

/// Evidence that one node received its machine configuration.
///
/// A changed configuration is pushed again in place; the node is not
/// rebuilt.
pub struct ConfigApplyResource {
    talos: SharedMachineApi,
    server: ResourceId,
    machine_config: ResourceId,
    secrets: ResourceId,
}

impl ConfigApplyResource {
    pub fn new(talos: SharedMachineApi, server: ResourceId, machine_config: ResourceId, secrets: ResourceId) -> Self {
        Self {
            talos,
            server,
            machine_config,
            secrets,
        }
    }

    /// Resources the push reads from
    pub fn dependencies(&self) -> [ResourceId; 3] {
        [self.server.clone(), self.machine_config.clone(), self.secrets.clone()]
    }
}

#[async_trait::async_trait]
impl Resource for ConfigApplyResource {
    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        let secrets: ClusterSecrets = upstream.typed(&self.secrets)?;
        let inputs = ApplyInputs {
            node: upstream.string(&self.server, "/ipv4")?,
            machine_config: upstream.string(&self.machine_config, "/machineConfig")?,
            client_configuration: secrets.client,
        };
        Ok(serde_json::to_value(inputs)?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        let inputs: ApplyInputs = decode(inputs)?;
        info!("Applying machine configuration to {}", inputs.node);
        self.talos
            .apply_configuration(&inputs.client_configuration, &inputs.node, &inputs.machine_config)
            .await?;
        Ok(json!({"node": inputs.node}))
    }
}
