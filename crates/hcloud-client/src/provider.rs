//! Load balancer as a graph resource
//!
//! Shared by every graph that declares a load balancer. Inputs are the
//! [`LoadBalancerSpec`]; outputs are [`LoadBalancerOutputs`].

use crate::ensure::{delete_load_balancer, ensure_load_balancer, LoadBalancerSpec};
use crate::hcloud_trait::HcloudClientTrait;
use crate::models::LoadBalancer;
use resource_graph::{GraphError, ProviderError, Resolved, Resource, ResourceRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub const KIND_LOAD_BALANCER: &str = "load-balancer";

/// What dependents see of a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerOutputs {
    pub id: u64,
    pub name: String,
    pub ipv4: String,
}

impl LoadBalancerOutputs {
    fn from_load_balancer(lb: &LoadBalancer) -> Result<Self, ProviderError> {
        let ipv4 = lb
            .ipv4()
            .ok_or_else(|| format!("load balancer {} has no public IPv4 address", lb.name))?;
        Ok(Self {
            id: lb.id,
            name: lb.name.clone(),
            ipv4: ipv4.to_string(),
        })
    }
}

/// A load balancer converged to a declared spec.
///
/// Spec changes that only add services or targets are applied in place;
/// a new name, type or location replaces it.
pub struct LoadBalancerResource {
    client: Arc<dyn HcloudClientTrait>,
    spec: LoadBalancerSpec,
}

impl LoadBalancerResource {
    pub fn new(client: Arc<dyn HcloudClientTrait>, spec: LoadBalancerSpec) -> Self {
        Self { client, spec }
    }

    async fn ensure(&self, spec: &LoadBalancerSpec) -> Result<Value, ProviderError> {
        let lb = ensure_load_balancer(self.client.as_ref(), spec).await?;
        Ok(serde_json::to_value(LoadBalancerOutputs::from_load_balancer(&lb)?)?)
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value.clone())?)
}

#[async_trait::async_trait]
impl Resource for LoadBalancerResource {
    fn inputs(&self, _upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        Ok(serde_json::to_value(&self.spec)?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        self.ensure(&decode(inputs)?).await
    }

    async fn update(&self, prior: &ResourceRecord, inputs: &Value) -> Result<Value, ProviderError> {
        let desired: LoadBalancerSpec = decode(inputs)?;
        let recorded: LoadBalancerSpec = decode(&prior.inputs)?;
        if recorded.requires_replacement(&desired) {
            info!("Load balancer {} moves to {}, replacing it", recorded.name, desired.name);
            self.delete(prior).await?;
        }
        self.ensure(&desired).await
    }

    async fn delete(&self, prior: &ResourceRecord) -> Result<(), ProviderError> {
        let outputs: LoadBalancerOutputs = decode(&prior.outputs)?;
        delete_load_balancer(self.client.as_ref(), outputs.id).await?;
        Ok(())
    }
}
