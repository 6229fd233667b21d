//! Cluster Provisioner
//!
//! Provisions a Talos Kubernetes cluster on Hetzner Cloud as one
//! dependency-ordered resource graph:
//! - Control-plane load balancer (TCP 6443 and 50000, targets `type=controlplane`)
//! - Cluster identity (CAs, tokens, admin client certificate)
//! - Machine configuration per role
//! - Servers, one per node, booted with their role's configuration
//! - Configuration apply per node, then a single bootstrap of the first control plane
//! - Admin kubeconfig
//!
//! Outputs are published to a file for the add-on layer.

mod backoff;
mod config;
mod controller;
mod error;
mod identity;
mod machine_config;
mod metrics;
mod pipeline;
mod publish;
mod resources;
mod server;

use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;
use crate::metrics::Metrics;
use controller::Controller;
use hcloud_client::HcloudClient;
use resource_graph::FileStateStore;
use std::sync::Arc;
use talos_client::TalosctlClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ProvisionerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Cluster Provisioner");

    let config = ProvisionerConfig::from_env()?;

    info!("Configuration:");
    info!("  Cluster: {}", config.cluster_name);
    info!("  Hetzner Cloud API: {}", config.hcloud_endpoint);
    info!(
        "  Nodes: {} control plane, {} worker ({})",
        config.control_plane_count,
        config.worker_count,
        config.locations.join(", ")
    );
    info!("  Server type: {}, image: {}", config.server_type, config.image);
    info!("  State file: {}", config.state_file.display());
    info!("  Outputs file: {}", config.outputs_file.display());
    match config.reconcile_interval {
        Some(interval) => info!("  Reconcile interval: {}s", interval.as_secs()),
        None => info!("  Reconcile interval: none (single run)"),
    }
    if config.preview {
        info!("  Preview: no provider calls will be made");
    }

    let hcloud = Arc::new(HcloudClient::new(config.hcloud_endpoint.clone(), config.hcloud_token.clone())?);
    let talos = Arc::new(TalosctlClient::new(config.talosctl.clone()));
    let store = FileStateStore::new(config.state_file.clone());
    let metrics = Arc::new(Metrics::new()?);

    let controller = Controller::new(config.clone(), hcloud, talos, store, metrics).await?;

    if config.reconcile_interval.is_some() {
        let probes = controller.probes().clone();
        let addr = config.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = server::serve(addr, probes).await {
                error!("Probe server stopped: {}", e);
            }
        });
    }

    controller.run().await?;

    Ok(())
}
