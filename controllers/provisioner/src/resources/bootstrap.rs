//! Cluster bootstrap barrier
//!
//! Bootstrapping is issued once, against the first control-plane node, and
//! only after every node has received its configuration. The resource can
//! only be declared through a [`BootstrapGate`], which carries the complete
//! list of configuration-apply ids as its dependencies.

use super::{decode, SharedMachineApi};
use crate::error::ProvisionerError;
use crate::identity::ClusterSecrets;
use resource_graph::{GraphBuilder, GraphError, Lifecycle, ProviderError, Resolved, Resource, ResourceId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use talos_client::{ClientConfiguration, TalosError};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapInputs {
    node: String,
    client_configuration: ClientConfiguration,
}

/// Aggregation barrier in front of the single bootstrap call
#[derive(Clone)]
pub struct BootstrapGate {
    talos: SharedMachineApi,
    target: ResourceId,
    secrets: ResourceId,
    applies: Vec<ResourceId>,
}

impl std::fmt::Debug for BootstrapGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapGate")
            .field("target", &self.target)
            .field("applies", &self.applies)
            .finish_non_exhaustive()
    }
}

impl BootstrapGate {
    /// Gate bootstrapping of `target` on every id in `applies`
    pub fn new(
        talos: SharedMachineApi,
        target: ResourceId,
        secrets: ResourceId,
        applies: Vec<ResourceId>,
    ) -> Result<Self, ProvisionerError> {
        if applies.is_empty() {
            return Err(ProvisionerError::InvalidConfig(
                "bootstrap needs at least one configuration apply to wait for".to_string(),
            ));
        }
        Ok(Self {
            talos,
            target,
            secrets,
            applies,
        })
    }

    /// Server that gets bootstrapped
    pub fn target(&self) -> &ResourceId {
        &self.target
    }

    /// Configuration applies the bootstrap waits for
    pub fn applies(&self) -> &[ResourceId] {
        &self.applies
    }

    /// Every edge of the barrier: all applies, the target and the identity
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = self.applies.clone();
        deps.push(self.target.clone());
        deps.push(self.secrets.clone());
        deps
    }

    /// Declare the bootstrap resource as `id`
    pub fn declare(self, builder: &mut GraphBuilder, id: ResourceId) -> Result<(), GraphError> {
        let deps = self.dependencies();
        info!(
            "Bootstrap of {} waits for {} configuration applies",
            self.target,
            self.applies.len()
        );
        builder.add(
            id,
            BootstrapResource {
                talos: self.talos,
                target: self.target,
                secrets: self.secrets,
            },
            &deps,
        )?;
        Ok(())
    }
}

/// Issued at most once: a recorded bootstrap is never repeated, whatever
/// its inputs become
struct BootstrapResource {
    talos: SharedMachineApi,
    target: ResourceId,
    secrets: ResourceId,
}

#[async_trait::async_trait]
impl Resource for BootstrapResource {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::create_only()
    }

    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        let secrets: ClusterSecrets = upstream.typed(&self.secrets)?;
        let inputs = BootstrapInputs {
            node: upstream.string(&self.target, "/ipv4")?,
            client_configuration: secrets.client,
        };
        Ok(serde_json::to_value(inputs)?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        let inputs: BootstrapInputs = decode(inputs)?;
        info!("Bootstrapping cluster on {}", inputs.node);
        match self.talos.bootstrap(&inputs.client_configuration, &inputs.node).await {
            Ok(()) => {}
            // Lost state: the node already runs etcd, which is what we wanted
            Err(TalosError::AlreadyBootstrapped(node)) => {
                warn!("{} is already bootstrapped, recording it", node);
            }
            Err(e) => return Err(e.into()),
        }
        Ok(json!({"node": inputs.node}))
    }
}
