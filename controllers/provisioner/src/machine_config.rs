//! Machine configuration rendering
//!
//! A node's boot configuration is the deep merge, in order, of a role base
//! template, the cluster-wide patch and an optional role-specific patch.
//! Rendering is pure: it only reads the identity bundle and the load
//! balancer address it is given.

use crate::error::ProvisionerError;
use crate::identity::ClusterSecrets;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

pub const TALOS_VERSION: &str = "v1.7.6";
pub const KUBERNETES_VERSION: &str = "v1.30.3";

/// Manifests every control plane applies after bootstrap
pub const CONTROL_PLANE_EXTRA_MANIFESTS: [&str; 2] = [
    "https://raw.githubusercontent.com/alex1989hu/kubelet-serving-cert-approver/main/deploy/standalone-install.yaml",
    "https://github.com/kubernetes-sigs/metrics-server/releases/latest/download/components.yaml",
];

/// Node role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(rename = "controlplane")]
    ControlPlane,
    Worker,
}

impl Role {
    /// Machine type in the configuration, also the `type` label value
    pub fn as_str(self) -> &'static str {
        match self {
            Role::ControlPlane => "controlplane",
            Role::Worker => "worker",
        }
    }

    /// Prefix of server names
    pub fn name_prefix(self) -> &'static str {
        match self {
            Role::ControlPlane => "control-plane",
            Role::Worker => "worker",
        }
    }

    /// Stable name of the `index`th node of this role
    pub fn node_name(self, index: usize) -> String {
        format!("{}-{}", self.name_prefix(), index)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one role's configuration is rendered from
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub cluster_name: &'a str,
    pub role: Role,
    pub load_balancer_ip: &'a str,
    pub install_disk: &'a str,
    pub secrets: &'a ClusterSecrets,
}

impl RenderRequest<'_> {
    /// Kubernetes API endpoint behind the control-plane load balancer
    pub fn endpoint(&self) -> String {
        control_plane_endpoint(self.load_balancer_ip)
    }
}

pub fn control_plane_endpoint(load_balancer_ip: &str) -> String {
    format!("https://{}:6443", load_balancer_ip)
}

/// Merge `patch` into `base`.
///
/// Mappings merge key by key; every other value, lists included, replaces
/// what was there.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Role defaults carrying the cluster identity
pub fn base_template(request: &RenderRequest<'_>) -> Value {
    let secrets = request.secrets;
    let control_plane = request.role == Role::ControlPlane;

    let machine_ca = if control_plane {
        json!({"crt": secrets.os_ca.crt, "key": secrets.os_ca.key})
    } else {
        json!({"crt": secrets.os_ca.crt, "key": ""})
    };

    let mut cluster = json!({
        "id": secrets.cluster_id,
        "secret": secrets.cluster_secret,
        "clusterName": request.cluster_name,
        "controlPlane": {"endpoint": request.endpoint()},
        "network": {
            "dnsDomain": "cluster.local",
            "podSubnets": ["10.244.0.0/16"],
            "serviceSubnets": ["10.96.0.0/12"],
        },
        "token": secrets.bootstrap_token,
        "ca": {
            "crt": secrets.kubernetes_ca.crt,
            "key": if control_plane { secrets.kubernetes_ca.key.as_str() } else { "" },
        },
        "proxy": {"image": format!("registry.k8s.io/kube-proxy:{}", KUBERNETES_VERSION)},
        "discovery": {
            "enabled": true,
            "registries": {
                "kubernetes": {"disabled": true},
                "service": {},
            },
        },
    });

    if control_plane {
        deep_merge(
            &mut cluster,
            &json!({
                "secretboxEncryptionSecret": secrets.secretbox_encryption_secret,
                "aggregatorCA": {"crt": secrets.aggregator_ca.crt, "key": secrets.aggregator_ca.key},
                "serviceAccount": {"key": secrets.service_account_key},
                "apiServer": {
                    "image": format!("registry.k8s.io/kube-apiserver:{}", KUBERNETES_VERSION),
                    "certSANs": [request.load_balancer_ip],
                },
                "controllerManager": {
                    "image": format!("registry.k8s.io/kube-controller-manager:{}", KUBERNETES_VERSION),
                },
                "scheduler": {
                    "image": format!("registry.k8s.io/kube-scheduler:{}", KUBERNETES_VERSION),
                },
                "etcd": {"ca": {"crt": secrets.etcd_ca.crt, "key": secrets.etcd_ca.key}},
            }),
        );
    }

    json!({
        "version": "v1alpha1",
        "debug": false,
        "persist": true,
        "machine": {
            "type": request.role.as_str(),
            "token": secrets.trustd_token,
            "ca": machine_ca,
            "certSANs": [],
            "kubelet": {
                "image": format!("ghcr.io/siderolabs/kubelet:{}", KUBERNETES_VERSION),
                "defaultRuntimeSeccompProfileEnabled": true,
            },
            "network": {},
            "install": {
                "disk": "/dev/sda",
                "image": format!("ghcr.io/siderolabs/installer:{}", TALOS_VERSION),
                "wipe": false,
            },
            "features": {
                "rbac": true,
                "stableHostname": true,
                "apidCheckExtKeyUsage": true,
            },
        },
        "cluster": cluster,
    })
}

/// Patch shared by every role: endpoint, SANs, install disk
pub fn cluster_patch(load_balancer_ip: &str, install_disk: &str) -> Value {
    json!({
        "machine": {
            "kubelet": {
                "extraArgs": {"rotate-server-certificates": "true"},
            },
            "install": {"disk": install_disk},
            "certSANs": [load_balancer_ip],
        },
        "cluster": {
            "controlPlane": {"endpoint": control_plane_endpoint(load_balancer_ip)},
            "apiServer": {"certSANs": [load_balancer_ip]},
        },
    })
}

/// Extra patch applied on top of the cluster patch for one role
pub fn role_patch(role: Role) -> Option<Value> {
    match role {
        Role::ControlPlane => Some(json!({
            "cluster": {"extraManifests": CONTROL_PLANE_EXTRA_MANIFESTS},
        })),
        Role::Worker => None,
    }
}

/// Merged configuration document as a JSON value
pub fn merged(request: &RenderRequest<'_>) -> Value {
    let mut document = base_template(request);
    deep_merge(&mut document, &cluster_patch(request.load_balancer_ip, request.install_disk));
    if let Some(patch) = role_patch(request.role) {
        deep_merge(&mut document, &patch);
    }
    document
}

/// Render the configuration document for one role as YAML
pub fn render(request: &RenderRequest<'_>) -> Result<String, ProvisionerError> {
    if request.load_balancer_ip.is_empty() {
        return Err(ProvisionerError::MachineConfig(
            "load balancer address is empty".to_string(),
        ));
    }
    Ok(serde_yaml::to_string(&merged(request))?)
}

#[cfg(test)]
#[path = "machine_config_test.rs"]
mod machine_config_test;
