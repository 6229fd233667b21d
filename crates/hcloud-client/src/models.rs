//! Hetzner Cloud API models
//!
//! These models match the JSON bodies of the Hetzner Cloud API v1.
//! See: https://docs.hetzner.cloud/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Labels attached to a resource
pub type Labels = BTreeMap<String, String>;

/// Error body returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// Asynchronous action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: u64,
    pub command: String,
    pub status: ActionStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub action: Action,
}

/// Server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    pub status: String,
    pub public_net: ServerPublicNet,
    pub server_type: NamedRef,
    pub datacenter: Datacenter,
    #[serde(default)]
    pub image: Option<NamedRef>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub created: String,
}

impl Server {
    /// Public IPv4 address, if one is assigned
    pub fn ipv4(&self) -> Option<&str> {
        self.public_net.ipv4.as_ref().map(|ip| ip.ip.as_str())
    }

    /// Location name (e.g. `fsn1`)
    pub fn location(&self) -> &str {
        &self.datacenter.location.name
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerPublicNet {
    #[serde(default)]
    pub ipv4: Option<IpAddress>,
    #[serde(default)]
    pub ipv6: Option<IpAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpAddress {
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datacenter {
    pub name: String,
    pub location: NamedRef,
}

/// Reference to a named object (server type, location, image)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRef {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
}

/// Request body for `POST /servers`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateServerRequest {
    pub name: String,
    pub server_type: String,
    pub image: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    pub labels: Labels,
    pub start_after_create: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateServerResponse {
    pub server: Server,
    pub action: Action,
    #[serde(default)]
    pub next_actions: Vec<Action>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerResponse {
    pub server: Server,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerList {
    pub servers: Vec<Server>,
}

/// Load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: u64,
    pub name: String,
    pub public_net: LoadBalancerPublicNet,
    pub location: NamedRef,
    pub load_balancer_type: NamedRef,
    #[serde(default)]
    pub services: Vec<LoadBalancerService>,
    #[serde(default)]
    pub targets: Vec<LoadBalancerTarget>,
    #[serde(default)]
    pub labels: Labels,
}

impl LoadBalancer {
    /// Public IPv4 address, if one is assigned
    pub fn ipv4(&self) -> Option<&str> {
        self.public_net.ipv4.ip.as_deref()
    }

    /// Whether a service already listens on `port`
    pub fn has_service(&self, listen_port: u16) -> bool {
        self.services.iter().any(|s| s.listen_port == listen_port)
    }

    /// Whether a label-selector target with this selector is already bound
    pub fn has_label_target(&self, selector: &str) -> bool {
        self.targets.iter().any(|t| {
            t.target_type == TargetType::LabelSelector
                && t.label_selector.as_ref().map(|l| l.selector.as_str()) == Some(selector)
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadBalancerPublicNet {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ipv4: OptionalIp,
    #[serde(default)]
    pub ipv6: OptionalIp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionalIp {
    #[serde(default)]
    pub ip: Option<String>,
}

/// Forwarding service of a load balancer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadBalancerService {
    pub protocol: String,
    pub listen_port: u16,
    pub destination_port: u16,
    #[serde(default)]
    pub proxyprotocol: bool,
}

impl LoadBalancerService {
    /// Plain TCP forwarding
    pub fn tcp(listen_port: u16, destination_port: u16) -> Self {
        Self {
            protocol: "tcp".to_string(),
            listen_port,
            destination_port,
            proxyprotocol: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Server,
    LabelSelector,
    Ip,
}

/// Target bound to a load balancer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadBalancerTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelectorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerRef>,
    #[serde(default)]
    pub use_private_ip: bool,
}

impl LoadBalancerTarget {
    /// Target resolving to every server carrying the selected labels
    pub fn label_selector(selector: impl Into<String>) -> Self {
        Self {
            target_type: TargetType::LabelSelector,
            label_selector: Some(LabelSelectorRef {
                selector: selector.into(),
            }),
            server: None,
            use_private_ip: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelSelectorRef {
    pub selector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRef {
    pub id: u64,
}

/// Request body for `POST /load_balancers`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub load_balancer_type: String,
    pub location: String,
    pub labels: Labels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoadBalancerResponse {
    pub load_balancer: LoadBalancer,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerResponse {
    pub load_balancer: LoadBalancer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerList {
    pub load_balancers: Vec<LoadBalancer>,
}
