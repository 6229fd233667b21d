//! Load balancer operations for MockHcloudClient

use super::MockHcloudClient;
use crate::error::HcloudError;
use crate::models::*;
use crate::selector::LabelSelector;

pub async fn get_load_balancer(client: &MockHcloudClient, id: u64) -> Result<LoadBalancer, HcloudError> {
    client
        .load_balancers
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| HcloudError::NotFound(format!("Load balancer {} not found", id)))
}

pub async fn get_load_balancer_by_name(
    client: &MockHcloudClient,
    name: &str,
) -> Result<Option<LoadBalancer>, HcloudError> {
    Ok(client
        .load_balancers
        .lock()
        .unwrap()
        .values()
        .find(|lb| lb.name == name)
        .cloned())
}

pub async fn create_load_balancer(
    client: &MockHcloudClient,
    request: &CreateLoadBalancerRequest,
) -> Result<CreateLoadBalancerResponse, HcloudError> {
    client.record("create_load_balancer", &request.name)?;

    if get_load_balancer_by_name(client, &request.name).await?.is_some() {
        return Err(HcloudError::Conflict(format!(
            "uniqueness_error: load balancer name {} is already used",
            request.name
        )));
    }

    let helpers = client.helpers();
    let load_balancer = LoadBalancer {
        id: client.next_id(),
        name: request.name.clone(),
        public_net: LoadBalancerPublicNet {
            enabled: true,
            ipv4: OptionalIp { ip: Some(helpers.ipv4()) },
            ipv6: OptionalIp::default(),
        },
        location: helpers.named(&request.location),
        load_balancer_type: helpers.named(&request.load_balancer_type),
        services: Vec::new(),
        targets: Vec::new(),
        labels: request.labels.clone(),
    };
    client
        .load_balancers
        .lock()
        .unwrap()
        .insert(load_balancer.id, load_balancer.clone());

    Ok(CreateLoadBalancerResponse {
        load_balancer,
        action: helpers.finished_action("create_load_balancer"),
    })
}

pub async fn add_service(
    client: &MockHcloudClient,
    load_balancer_id: u64,
    service: &LoadBalancerService,
) -> Result<Action, HcloudError> {
    client.record("add_service", &format!("{}/{}", load_balancer_id, service.listen_port))?;

    let mut load_balancers = client.load_balancers.lock().unwrap();
    let load_balancer = load_balancers
        .get_mut(&load_balancer_id)
        .ok_or_else(|| HcloudError::NotFound(format!("Load balancer {} not found", load_balancer_id)))?;
    if load_balancer.has_service(service.listen_port) {
        return Err(HcloudError::Conflict(format!(
            "source_port_already_used: {}",
            service.listen_port
        )));
    }
    load_balancer.services.push(service.clone());
    drop(load_balancers);

    Ok(client.helpers().finished_action("add_service"))
}

pub async fn add_label_target(
    client: &MockHcloudClient,
    load_balancer_id: u64,
    selector: &LabelSelector,
) -> Result<Action, HcloudError> {
    client.record("add_target", &format!("{}/{}", load_balancer_id, selector))?;

    let mut load_balancers = client.load_balancers.lock().unwrap();
    let load_balancer = load_balancers
        .get_mut(&load_balancer_id)
        .ok_or_else(|| HcloudError::NotFound(format!("Load balancer {} not found", load_balancer_id)))?;
    if load_balancer.has_label_target(selector.as_str()) {
        return Err(HcloudError::Conflict(format!("target_already_defined: {}", selector)));
    }
    load_balancer
        .targets
        .push(LoadBalancerTarget::label_selector(selector.as_str()));
    drop(load_balancers);

    Ok(client.helpers().finished_action("add_target"))
}

pub async fn delete_load_balancer(client: &MockHcloudClient, id: u64) -> Result<(), HcloudError> {
    client.record("delete_load_balancer", &id.to_string())?;
    client
        .load_balancers
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| HcloudError::NotFound(format!("Load balancer {} not found", id)))
}

pub fn resolved_targets(client: &MockHcloudClient, load_balancer_id: u64) -> Vec<String> {
    let selectors: Vec<LabelSelector> = match client.load_balancers.lock().unwrap().get(&load_balancer_id) {
        Some(load_balancer) => load_balancer
            .targets
            .iter()
            .filter_map(|t| t.label_selector.as_ref())
            .filter_map(|l| LabelSelector::parse(&l.selector).ok())
            .collect(),
        None => return Vec::new(),
    };

    client
        .servers()
        .into_iter()
        .filter(|s| selectors.iter().any(|sel| sel.matches(&s.labels)))
        .map(|s| s.name)
        .collect()
}
