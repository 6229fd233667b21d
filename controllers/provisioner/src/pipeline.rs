//! Provisioning graph
//!
//! Declares the cluster as a resource graph:
//!
//! ```text
//! load-balancer ─┬─> machine-config/<role> ──> server/<role>-<i> ──> config-apply/<role>-<i> ─┐
//! secrets ───────┴──────────────────────────────────────────────────────────────────────────┴─> bootstrap ──> kubeconfig
//! ```
//!
//! Servers of both roles are independent of each other and evaluated
//! concurrently; the bootstrap barrier waits for every configuration apply.

use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;
use crate::machine_config::Role;
use crate::resources::{
    BootstrapGate, ConfigApplyResource, KubeconfigResource, LoadBalancerResource, MachineConfigResource,
    SecretsResource, ServerReaper, ServerResource, SharedHcloud, SharedMachineApi, KIND_BOOTSTRAP,
    KIND_CONFIG_APPLY, KIND_KUBECONFIG, KIND_LOAD_BALANCER, KIND_MACHINE_CONFIG, KIND_SECRETS, KIND_SERVER,
};
use hcloud_client::{Labels, LoadBalancerService, LoadBalancerSpec, TargetBinding};
use resource_graph::{Graph, GraphBuilder, ResourceId};
use std::sync::Arc;
use tracing::debug;

/// Name of the management load balancer
pub const CONTROL_PLANE_LB_NAME: &str = "control-plane";

/// Kubernetes API port
pub const KUBERNETES_API_PORT: u16 = 6443;

/// Talos API port
pub const TALOS_API_PORT: u16 = 50000;

/// Ids of everything the pipeline declares
#[derive(Debug, Clone)]
pub struct PipelineIds {
    pub load_balancer: ResourceId,
    pub secrets: ResourceId,
    pub control_plane_config: ResourceId,
    pub worker_config: ResourceId,
    pub control_planes: Vec<ResourceId>,
    pub workers: Vec<ResourceId>,
    pub applies: Vec<ResourceId>,
    /// First control-plane server, the only one ever bootstrapped
    pub bootstrap_target: ResourceId,
    pub bootstrap: ResourceId,
    pub kubeconfig: ResourceId,
}

/// A built provisioning graph
#[derive(Debug)]
pub struct Pipeline {
    pub graph: Graph,
    pub ids: PipelineIds,
}

/// Location of the `index`th node: round robin over `locations`
pub fn location_for(locations: &[String], index: usize) -> Result<&str, ProvisionerError> {
    if locations.is_empty() {
        return Err(ProvisionerError::InvalidConfig("no locations configured".to_string()));
    }
    Ok(&locations[index % locations.len()])
}

/// Management load balancer: Kubernetes and Talos APIs of every control plane
pub fn control_plane_lb_spec(config: &ProvisionerConfig) -> LoadBalancerSpec {
    LoadBalancerSpec {
        name: CONTROL_PLANE_LB_NAME.to_string(),
        load_balancer_type: config.lb_type.clone(),
        location: config.lb_location.clone(),
        labels: Labels::new(),
        services: vec![
            LoadBalancerService::tcp(KUBERNETES_API_PORT, KUBERNETES_API_PORT),
            LoadBalancerService::tcp(TALOS_API_PORT, TALOS_API_PORT),
        ],
        targets: vec![TargetBinding::role(Role::ControlPlane.as_str())],
    }
}

/// Build the provisioning graph for `config`
pub fn build(
    config: &ProvisionerConfig,
    hcloud: SharedHcloud,
    talos: SharedMachineApi,
) -> Result<Pipeline, ProvisionerError> {
    if config.control_plane_count == 0 {
        return Err(ProvisionerError::InvalidConfig(
            "at least one control-plane node is required".to_string(),
        ));
    }

    let load_balancer = ResourceId::new(KIND_LOAD_BALANCER, CONTROL_PLANE_LB_NAME);
    let secrets = ResourceId::new(KIND_SECRETS, &config.cluster_name);

    let mut builder = Graph::builder();
    builder.add(
        load_balancer.clone(),
        LoadBalancerResource::new(Arc::clone(&hcloud), control_plane_lb_spec(config)),
        &[],
    )?;
    builder.add(secrets.clone(), SecretsResource::new(&config.cluster_name), &[])?;

    let mut applies = Vec::new();
    let declared = RoleDeps {
        load_balancer: &load_balancer,
        secrets: &secrets,
    };
    let (control_plane_config, control_planes) = declare_role(
        &mut builder,
        config,
        Role::ControlPlane,
        config.control_plane_count,
        &declared,
        &hcloud,
        &talos,
        &mut applies,
    )?;
    let (worker_config, workers) = declare_role(
        &mut builder,
        config,
        Role::Worker,
        config.worker_count,
        &declared,
        &hcloud,
        &talos,
        &mut applies,
    )?;

    let bootstrap = ResourceId::new(KIND_BOOTSTRAP, &config.cluster_name);
    let bootstrap_target = control_planes
        .first()
        .cloned()
        .ok_or_else(|| ProvisionerError::InvalidConfig("no control-plane server declared".to_string()))?;
    BootstrapGate::new(Arc::clone(&talos), bootstrap_target.clone(), secrets.clone(), applies.clone())?
        .declare(&mut builder, bootstrap.clone())?;

    let kubeconfig = ResourceId::new(KIND_KUBECONFIG, &config.cluster_name);
    let fetcher = KubeconfigResource::new(
        Arc::clone(&talos),
        load_balancer.clone(),
        bootstrap_target.clone(),
        secrets.clone(),
        bootstrap.clone(),
    );
    let deps = fetcher.dependencies();
    builder.add(kubeconfig.clone(), fetcher, &deps)?;

    builder.reaper(KIND_SERVER, ServerReaper::new(hcloud));

    Ok(Pipeline {
        graph: builder.build()?,
        ids: PipelineIds {
            load_balancer,
            secrets,
            control_plane_config,
            worker_config,
            control_planes,
            workers,
            applies,
            bootstrap_target,
            bootstrap,
            kubeconfig,
        },
    })
}

/// Upstream resources every role reads from
struct RoleDeps<'a> {
    load_balancer: &'a ResourceId,
    secrets: &'a ResourceId,
}

/// Declare the renderer, servers and configuration applies of one role
#[allow(clippy::too_many_arguments)]
fn declare_role(
    builder: &mut GraphBuilder,
    config: &ProvisionerConfig,
    role: Role,
    count: usize,
    deps: &RoleDeps<'_>,
    hcloud: &SharedHcloud,
    talos: &SharedMachineApi,
    applies: &mut Vec<ResourceId>,
) -> Result<(ResourceId, Vec<ResourceId>), ProvisionerError> {
    let machine_config = ResourceId::new(KIND_MACHINE_CONFIG, role.as_str());
    let renderer = MachineConfigResource::new(
        role,
        &config.cluster_name,
        &config.install_disk,
        deps.load_balancer.clone(),
        deps.secrets.clone(),
    );
    let renderer_deps = renderer.dependencies();
    builder.add(machine_config.clone(), renderer, &renderer_deps)?;

    let mut servers = Vec::with_capacity(count);
    for index in 0..count {
        let name = role.node_name(index);
        let location = location_for(&config.locations, index)?;
        debug!("{} goes to {}", name, location);

        let server = ResourceId::new(KIND_SERVER, &name);
        builder.add(
            server.clone(),
            ServerResource::new(
                Arc::clone(hcloud),
                role,
                index,
                location,
                &config.server_type,
                &config.image,
                machine_config.clone(),
            ),
            &[machine_config.clone()],
        )?;

        let apply = ResourceId::new(KIND_CONFIG_APPLY, &name);
        let applier = ConfigApplyResource::new(
            Arc::clone(talos),
            server.clone(),
            machine_config.clone(),
            deps.secrets.clone(),
        );
        let apply_deps = applier.dependencies();
        builder.add(apply.clone(), applier, &apply_deps)?;

        servers.push(server);
        applies.push(apply);
    }
    Ok((machine_config, servers))
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
