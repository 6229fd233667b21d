//! Server provider

use super::{decode, SharedHcloud, ACTION_POLL_INTERVAL, ACTION_TIMEOUT};
use crate::machine_config::Role;
use hcloud_client::{wait_for_action, CreateServerRequest, HcloudError, Labels, Server};
use resource_graph::{GraphError, Lifecycle, ProviderError, Reaper, Resolved, Resource, ResourceId, ResourceRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Inputs of one server, exactly as recorded in state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInputs {
    pub name: String,
    pub location: String,
    pub server_type: String,
    pub image: String,
    pub labels: Labels,
    pub user_data: String,
}

/// What dependents see of a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerOutputs {
    pub id: u64,
    pub name: String,
    pub ipv4: String,
    pub location: String,
}

impl ServerOutputs {
    fn from_server(server: &Server) -> Result<Self, ProviderError> {
        let ipv4 = server
            .ipv4()
            .ok_or_else(|| format!("server {} has no public IPv4 address", server.name))?;
        Ok(Self {
            id: server.id,
            name: server.name.clone(),
            ipv4: ipv4.to_string(),
            location: server.location().to_string(),
        })
    }
}

/// One node. The rendered machine configuration is passed as user data but
/// never triggers a replacement; everything else does.
pub struct ServerResource {
    client: SharedHcloud,
    name: String,
    role: Role,
    location: String,
    server_type: String,
    image: String,
    machine_config: ResourceId,
}

impl ServerResource {
    pub fn new(
        client: SharedHcloud,
        role: Role,
        index: usize,
        location: impl Into<String>,
        server_type: impl Into<String>,
        image: impl Into<String>,
        machine_config: ResourceId,
    ) -> Self {
        Self {
            client,
            name: role.node_name(index),
            role,
            location: location.into(),
            server_type: server_type.into(),
            image: image.into(),
            machine_config,
        }
    }
}

#[async_trait::async_trait]
impl Resource for ServerResource {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::replace().ignore_changes(["user_data"])
    }

    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        let inputs = ServerInputs {
            name: self.name.clone(),
            location: self.location.clone(),
            server_type: self.server_type.clone(),
            image: self.image.clone(),
            labels: Labels::from([("type".to_string(), self.role.as_str().to_string())]),
            user_data: upstream.string(&self.machine_config, "/machineConfig")?,
        };
        Ok(serde_json::to_value(inputs)?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        let inputs: ServerInputs = decode(inputs)?;

        // Adopt a server created by an earlier, interrupted evaluation
        if let Some(existing) = self.client.get_server_by_name(&inputs.name).await? {
            check_adoptable(&existing, &inputs)?;
            info!("Adopting existing server {} (id {})", existing.name, existing.id);
            return Ok(serde_json::to_value(ServerOutputs::from_server(&existing)?)?);
        }

        info!(
            "Creating server {} ({} in {})",
            inputs.name, inputs.server_type, inputs.location
        );
        let created = self
            .client
            .create_server(&CreateServerRequest {
                name: inputs.name.clone(),
                server_type: inputs.server_type,
                image: inputs.image,
                location: inputs.location,
                user_data: Some(inputs.user_data),
                labels: inputs.labels,
                start_after_create: true,
            })
            .await?;
        wait_for_action(self.client.as_ref(), created.action, ACTION_POLL_INTERVAL, ACTION_TIMEOUT).await?;

        let server = if created.server.ipv4().is_some() {
            created.server
        } else {
            self.client.get_server(created.server.id).await?
        };
        Ok(serde_json::to_value(ServerOutputs::from_server(&server)?)?)
    }

    async fn delete(&self, prior: &ResourceRecord) -> Result<(), ProviderError> {
        delete_recorded(self.client.as_ref(), prior).await
    }
}

/// An existing server may only stand in for one that matches its inputs and
/// is not on its way out.
fn check_adoptable(existing: &Server, inputs: &ServerInputs) -> Result<(), ProviderError> {
    if existing.status == "deleting" {
        return Err(format!("server {} (id {}) is still being deleted", existing.name, existing.id).into());
    }

    let mut mismatches = Vec::new();
    if existing.server_type.name != inputs.server_type {
        mismatches.push(format!("type {} != {}", existing.server_type.name, inputs.server_type));
    }
    if existing.location() != inputs.location {
        mismatches.push(format!("location {} != {}", existing.location(), inputs.location));
    }
    for (key, value) in &inputs.labels {
        if existing.labels.get(key) != Some(value) {
            mismatches.push(format!(
                "label {}={} != {}",
                key,
                existing.labels.get(key).map(String::as_str).unwrap_or("<unset>"),
                value
            ));
        }
    }

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "server {} (id {}) exists but does not match: {}",
            existing.name,
            existing.id,
            mismatches.join(", ")
        )
        .into())
    }
}

/// Deletes servers that are still recorded but no longer declared
pub struct ServerReaper {
    client: SharedHcloud,
}

impl ServerReaper {
    pub fn new(client: SharedHcloud) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Reaper for ServerReaper {
    async fn delete(&self, record: &ResourceRecord) -> Result<(), ProviderError> {
        delete_recorded(self.client.as_ref(), record).await
    }
}

async fn delete_recorded(
    client: &dyn hcloud_client::HcloudClientTrait,
    record: &ResourceRecord,
) -> Result<(), ProviderError> {
    let outputs: ServerOutputs = decode(&record.outputs)?;
    info!("Deleting server {} (id {})", outputs.name, outputs.id);
    match client.delete_server(outputs.id).await {
        Ok(action) => {
            // The name stays taken until the deletion has finished
            wait_for_action(client, action, ACTION_POLL_INTERVAL, ACTION_TIMEOUT).await?;
            Ok(())
        }
        Err(HcloudError::NotFound(_)) => {
            warn!("Server {} was already gone", outputs.name);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
