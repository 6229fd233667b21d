//! Resource providers of the provisioning graph
//!
//! Each provider renders its inputs from upstream outputs and talks to one
//! external service: the cloud API (`HcloudClientTrait`) or the management
//! plane (`MachineApiTrait`). The load balancer provider lives next to the
//! cloud client and is shared with the add-on layer. Clients are shared behind `Arc` so the mocks
//! can stand in for them in tests.

pub mod bootstrap;
pub mod config_apply;
pub mod kubeconfig;
pub mod machine_config;
pub mod secrets;
pub mod server;

use hcloud_client::HcloudClientTrait;
use resource_graph::ProviderError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use talos_client::MachineApiTrait;

pub use bootstrap::BootstrapGate;
pub use config_apply::ConfigApplyResource;
pub use kubeconfig::KubeconfigResource;
pub use machine_config::MachineConfigResource;
pub use secrets::SecretsResource;
pub use server::{ServerOutputs, ServerReaper, ServerResource};

pub use hcloud_client::{LoadBalancerOutputs, LoadBalancerResource, KIND_LOAD_BALANCER};

/// Cloud API client shared by the providers
pub type SharedHcloud = Arc<dyn HcloudClientTrait>;

/// Management-plane client shared by the providers
pub type SharedMachineApi = Arc<dyn MachineApiTrait>;

pub const KIND_SECRETS: &str = "secrets";
pub const KIND_MACHINE_CONFIG: &str = "machine-config";
pub const KIND_SERVER: &str = "server";
pub const KIND_CONFIG_APPLY: &str = "config-apply";
pub const KIND_BOOTSTRAP: &str = "bootstrap";
pub const KIND_KUBECONFIG: &str = "kubeconfig";

pub(crate) const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub(crate) const ACTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Decode a provider's own inputs or recorded outputs
pub(crate) fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value.clone())?)
}
