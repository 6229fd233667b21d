//! Idempotent load-balancer declaration
//!
//! Looks the load balancer up by name, creates it when missing and adds only
//! the services and label-selector targets it does not have yet, so calling
//! it again with the same spec issues no mutating requests.

use crate::error::HcloudError;
use crate::hcloud_trait::HcloudClientTrait;
use crate::models::{CreateLoadBalancerRequest, Labels, LoadBalancer, LoadBalancerService};
use crate::selector::LabelSelector;
use crate::wait::wait_for_action;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(1);
const ACTION_TIMEOUT: Duration = Duration::from_secs(300);

/// How the backends of a load balancer are chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "selector")]
pub enum TargetBinding {
    /// Every server currently carrying the selected labels
    LabelSelector(String),
}

impl TargetBinding {
    /// Binding for servers labelled `type=<role>`
    pub fn role(role: &str) -> Self {
        TargetBinding::LabelSelector(format!("type={}", role))
    }

    pub fn selector(&self) -> Result<LabelSelector, HcloudError> {
        match self {
            TargetBinding::LabelSelector(raw) => LabelSelector::parse(raw),
        }
    }
}

/// Desired state of a load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    pub name: String,
    pub load_balancer_type: String,
    pub location: String,
    #[serde(default)]
    pub labels: Labels,
    pub services: Vec<LoadBalancerService>,
    pub targets: Vec<TargetBinding>,
}

impl LoadBalancerSpec {
    /// Whether changing from `self` to `other` needs a new load balancer
    pub fn requires_replacement(&self, other: &LoadBalancerSpec) -> bool {
        self.name != other.name
            || self.location != other.location
            || self.load_balancer_type != other.load_balancer_type
    }
}

/// Bring the named load balancer to `spec`, returning its current state
pub async fn ensure_load_balancer<C: HcloudClientTrait + ?Sized>(
    client: &C,
    spec: &LoadBalancerSpec,
) -> Result<LoadBalancer, HcloudError> {
    let selectors = spec
        .targets
        .iter()
        .map(TargetBinding::selector)
        .collect::<Result<Vec<_>, _>>()?;

    let mut load_balancer = match client.get_load_balancer_by_name(&spec.name).await? {
        Some(existing) => {
            debug!("Load balancer {} exists (id {})", spec.name, existing.id);
            existing
        }
        None => {
            info!("Creating load balancer {} ({} in {})", spec.name, spec.load_balancer_type, spec.location);
            let created = client
                .create_load_balancer(&CreateLoadBalancerRequest {
                    name: spec.name.clone(),
                    load_balancer_type: spec.load_balancer_type.clone(),
                    location: spec.location.clone(),
                    labels: spec.labels.clone(),
                })
                .await?;
            wait_for_action(client, created.action, ACTION_POLL_INTERVAL, ACTION_TIMEOUT).await?;
            created.load_balancer
        }
    };

    let mut changed = false;
    for service in &spec.services {
        if load_balancer.has_service(service.listen_port) {
            continue;
        }
        info!(
            "Adding service {} -> {} to load balancer {}",
            service.listen_port, service.destination_port, spec.name
        );
        let action = client.add_service(load_balancer.id, service).await?;
        wait_for_action(client, action, ACTION_POLL_INTERVAL, ACTION_TIMEOUT).await?;
        changed = true;
    }

    for selector in &selectors {
        if load_balancer.has_label_target(selector.as_str()) {
            continue;
        }
        info!("Binding load balancer {} to servers matching {}", spec.name, selector);
        let action = client.add_label_target(load_balancer.id, selector).await?;
        wait_for_action(client, action, ACTION_POLL_INTERVAL, ACTION_TIMEOUT).await?;
        changed = true;
    }

    if changed {
        load_balancer = client.get_load_balancer(load_balancer.id).await?;
    }
    Ok(load_balancer)
}

/// Delete a load balancer by id; an already deleted one is not an error
pub async fn delete_load_balancer<C: HcloudClientTrait + ?Sized>(client: &C, id: u64) -> Result<(), HcloudError> {
    match client.delete_load_balancer(id).await {
        Ok(()) | Err(HcloudError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
