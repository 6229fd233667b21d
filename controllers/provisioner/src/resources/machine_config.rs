//! Machine configuration data source

use crate::identity::ClusterSecrets;
use crate::machine_config::{render, RenderRequest, Role};
use resource_graph::{GraphError, Lifecycle, ProviderError, Resolved, Resource, ResourceId};
use serde_json::{json, Value};

/// Renders one role's configuration from the control-plane load balancer
/// address and the cluster identity. Re-rendered on every evaluation.
pub struct MachineConfigResource {
    role: Role,
    cluster_name: String,
    install_disk: String,
    load_balancer: ResourceId,
    secrets: ResourceId,
}

impl MachineConfigResource {
    pub fn new(
        role: Role,
        cluster_name: impl Into<String>,
        install_disk: impl Into<String>,
        load_balancer: ResourceId,
        secrets: ResourceId,
    ) -> Self {
        Self {
            role,
            cluster_name: cluster_name.into(),
            install_disk: install_disk.into(),
            load_balancer,
            secrets,
        }
    }

    /// Resources the rendering reads from
    pub fn dependencies(&self) -> [ResourceId; 2] {
        [self.load_balancer.clone(), self.secrets.clone()]
    }
}

#[async_trait::async_trait]
impl Resource for MachineConfigResource {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::data_source()
    }

    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        let load_balancer_ip = upstream.string(&self.load_balancer, "/ipv4")?;
        let secrets: ClusterSecrets = upstream.typed(&self.secrets)?;
        let request = RenderRequest {
            cluster_name: &self.cluster_name,
            role: self.role,
            load_balancer_ip: &load_balancer_ip,
            install_disk: &self.install_disk,
            secrets: &secrets,
        };
        let machine_config = render(&request).map_err(|e| GraphError::InvalidInputs {
            resource: upstream.resource().clone(),
            message: e.to_string(),
        })?;
        Ok(json!({
            "role": self.role,
            "endpoint": request.endpoint(),
            "machineConfig": machine_config,
        }))
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        Ok(inputs.clone())
    }
}
