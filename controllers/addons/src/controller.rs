//! Add-on controller
//!
//! Reads the provisioner's published outputs, declares the selected add-ons
//! and evaluates them against the add-on state file. The ingress load
//! balancer's address is published back into the same outputs file.

use crate::addons::{self, ingress_load_balancer_id, AddOn, AddonContext};
use crate::config::AddonsConfig;
use crate::error::AddonError;
use crate::resources::LoadBalancerOutputs;
use resource_graph::{Engine, GraphError, Outputs, Report, StateStore};
use tracing::{error, info, warn};

/// Output read by the add-on layer: cloud API token
pub const HCLOUD_TOKEN: &str = "hcloud_token";
/// Output read by the add-on layer: admin kubeconfig
pub const KUBECONFIG: &str = "kubeconfig";
/// Output written by the add-on layer
pub const HTTP_INGRESS_IP: &str = "http_ingress_ip";

#[derive(Debug, Clone)]
pub struct Published {
    pub hcloud_token: String,
    pub kubeconfig: String,
}

impl Published {
    /// Values the provisioner must have published before add-ons can be declared
    pub fn load(config: &AddonsConfig) -> Result<Self, AddonError> {
        let outputs = Outputs::load(&config.outputs_file).map_err(|e| {
            error!("Cannot read published outputs from {}: {}", config.outputs_file.display(), e);
            error!("Run the cluster provisioner first, or point OUTPUTS_FILE at its outputs");
            e
        })?;
        Ok(Self {
            hcloud_token: outputs.require(HCLOUD_TOKEN)?.to_string(),
            kubeconfig: outputs.require(KUBECONFIG)?.to_string(),
        })
    }
}

pub struct Controller<S: StateStore> {
    config: AddonsConfig,
    ctx: AddonContext,
    engine: Engine<S>,
}

impl<S: StateStore> Controller<S> {
    pub fn new(config: AddonsConfig, ctx: AddonContext, store: S) -> Self {
        let engine = if config.preview {
            Engine::preview(store)
        } else {
            Engine::new(store)
        };
        Self { config, ctx, engine }
    }

    pub async fn evaluate(&self) -> Result<Report, AddonError> {
        let selected = addons::plan(&self.config);
        info!(
            "Declaring add-ons: {}",
            selected.iter().map(AddOn::to_string).collect::<Vec<_>>().join(", ")
        );
        let graph = addons::build(&selected, &self.ctx)?;

        let report = self.engine.evaluate(&graph).await?;
        for (id, action) in report.changes() {
            info!("  {:?} {}", action, id);
        }
        for (id, message) in report.failures() {
            error!("  {} failed: {}", id, message);
        }
        for id in report.blocked() {
            warn!("  {} blocked", id);
        }
        info!("Add-on evaluation finished: {}", report.summary());

        if !self.config.preview && report.is_success() {
            self.publish()?;
        }
        Ok(report)
    }

    /// Evaluate once; an unconverged graph is an error
    pub async fn run(&self) -> Result<(), AddonError> {
        self.evaluate().await?.into_result()?;
        Ok(())
    }

    fn publish(&self) -> Result<(), AddonError> {
        let state = self.engine.store().load()?;
        let id = ingress_load_balancer_id();
        let record = state
            .get(&id)
            .ok_or_else(|| GraphError::State(format!("{} has not been applied", id)))?;
        let load_balancer: LoadBalancerOutputs = serde_json::from_value(record.outputs.clone())?;

        let mut outputs = Outputs::load_or_default(&self.config.outputs_file)?;
        outputs.set(HTTP_INGRESS_IP, load_balancer.ipv4.clone());
        outputs.save(&self.config.outputs_file)?;
        info!("Published {}={}", HTTP_INGRESS_IP, load_balancer.ipv4);
        Ok(())
    }
}
