//! Cluster Add-ons
//!
//! Declares the add-ons of a provisioned cluster from the outputs the
//! provisioner published:
//! - Cloud storage driver and its token secret
//! - Ingress controller and the ingress load balancer
//! - Optional certificate issuer, database operator, observability stack
//!   and smoke-test workloads, selected by flags

mod addons;
mod cluster;
mod config;
mod controller;
mod error;
mod helm;
mod manifests;
#[cfg(test)]
mod mock;
mod resources;

use crate::addons::AddonContext;
use crate::cluster::KubeCluster;
use crate::config::AddonsConfig;
use crate::controller::{Controller, Published};
use crate::error::AddonError;
use crate::helm::HelmCli;
use hcloud_client::{HcloudClient, HcloudClientTrait};
use resource_graph::FileStateStore;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AddonError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure rustls crypto provider before any TLS connection
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        error!("A rustls crypto provider was already installed");
    }

    info!("Starting Cluster Add-ons");

    let config = AddonsConfig::from_env()?;

    info!("Configuration:");
    info!("  Outputs file: {}", config.outputs_file.display());
    info!("  State file: {}", config.state_file.display());
    info!("  Certificate issuer: {}", config.enable_cert_manager);
    info!("  Database operator: {}", config.enable_database_operator);
    if config.enable_observability {
        info!("  Observability: enabled ({})", config.observability_profile);
    } else {
        info!("  Observability: disabled");
    }
    info!("  Test workloads: {}", config.enable_test_workloads);
    info!("  Ingress host: {}", config.ingress_host.as_deref().unwrap_or("none"));

    let published = Published::load(&config)?;

    let hcloud = HcloudClient::new(config.hcloud_endpoint.clone(), published.hcloud_token.clone())?;
    hcloud.validate_token().await.map_err(|e| {
        error!("Published Hetzner Cloud token was rejected: {}", e);
        e
    })?;

    let cluster = KubeCluster::from_kubeconfig(&published.kubeconfig).await?;
    cluster.check().await?;
    let helm = HelmCli::new(config.helm.clone(), &published.kubeconfig).await?;

    let ctx = AddonContext {
        cluster: Arc::new(cluster),
        helm: Arc::new(helm),
        hcloud: Arc::new(hcloud),
        hcloud_token: published.hcloud_token,
    };
    let store = FileStateStore::new(config.state_file.clone());

    Controller::new(config, ctx, store).run().await?;

    Ok(())
}
