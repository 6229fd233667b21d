use super::*;
use serde_json::json;
use std::sync::OnceLock;

fn secrets() -> &'static ClusterSecrets {
    static SECRETS: OnceLock<ClusterSecrets> = OnceLock::new();
    SECRETS.get_or_init(|| ClusterSecrets::generate("talos").unwrap())
}

fn request(role: Role) -> RenderRequest<'static> {
    RenderRequest {
        cluster_name: "talos",
        role,
        load_balancer_ip: "203.0.113.1",
        install_disk: "/dev/sda",
        secrets: secrets(),
    }
}

fn parse(yaml: &str) -> serde_yaml::Value {
    serde_yaml::from_str(yaml).unwrap()
}

#[test]
fn test_deep_merge_overrides_leaves() {
    let mut base = json!({"machine": {"install": {"disk": "/dev/vda", "wipe": false}, "type": "worker"}});
    deep_merge(&mut base, &json!({"machine": {"install": {"disk": "/dev/sda"}}}));
    assert_eq!(
        base,
        json!({"machine": {"install": {"disk": "/dev/sda", "wipe": false}, "type": "worker"}})
    );
}

#[test]
fn test_deep_merge_replaces_lists_wholesale() {
    let mut base = json!({"certSANs": ["a", "b", "c"]});
    deep_merge(&mut base, &json!({"certSANs": ["z"]}));
    assert_eq!(base, json!({"certSANs": ["z"]}));
}

#[test]
fn test_deep_merge_mapping_over_scalar_and_null_leaf() {
    let mut base = json!({"network": "default", "keep": 1});
    deep_merge(&mut base, &json!({"network": {"cni": "flannel"}, "keep": null}));
    assert_eq!(base, json!({"network": {"cni": "flannel"}, "keep": null}));
}

#[test]
fn test_control_plane_document() {
    let yaml = render(&request(Role::ControlPlane)).unwrap();
    let doc = parse(&yaml);

    assert_eq!(doc["version"].as_str(), Some("v1alpha1"));
    assert_eq!(doc["machine"]["type"].as_str(), Some("controlplane"));
    assert_eq!(doc["machine"]["install"]["disk"].as_str(), Some("/dev/sda"));
    assert_eq!(
        doc["machine"]["kubelet"]["extraArgs"]["rotate-server-certificates"].as_str(),
        Some("true")
    );
    assert_eq!(doc["machine"]["certSANs"][0].as_str(), Some("203.0.113.1"));
    assert_eq!(
        doc["cluster"]["controlPlane"]["endpoint"].as_str(),
        Some("https://203.0.113.1:6443")
    );
    assert_eq!(doc["cluster"]["apiServer"]["certSANs"][0].as_str(), Some("203.0.113.1"));
    assert_eq!(
        doc["cluster"]["extraManifests"]
            .as_sequence()
            .map(|manifests| manifests.len()),
        Some(2)
    );
    assert_eq!(doc["cluster"]["clusterName"].as_str(), Some("talos"));
    assert!(doc["cluster"]["etcd"]["ca"]["key"].as_str().is_some());
    // Defaults the patches do not touch survive the merge
    assert_eq!(doc["machine"]["install"]["wipe"].as_bool(), Some(false));
}

#[test]
fn test_worker_document() {
    let doc = parse(&render(&request(Role::Worker)).unwrap());

    assert_eq!(doc["machine"]["type"].as_str(), Some("worker"));
    assert_eq!(
        doc["cluster"]["controlPlane"]["endpoint"].as_str(),
        Some("https://203.0.113.1:6443")
    );
    assert!(doc["cluster"].get("etcd").is_none());
    assert!(doc["cluster"].get("extraManifests").is_none());
    assert_eq!(doc["machine"]["ca"]["key"].as_str(), Some(""));
    assert_eq!(doc["cluster"]["ca"]["key"].as_str(), Some(""));
}

#[test]
fn test_install_disk_patch() {
    let mut req = request(Role::Worker);
    req.install_disk = "/dev/nvme0n1";
    let doc = parse(&render(&req).unwrap());
    assert_eq!(doc["machine"]["install"]["disk"].as_str(), Some("/dev/nvme0n1"));
}

#[test]
fn test_render_is_deterministic() {
    let first = render(&request(Role::ControlPlane)).unwrap();
    let second = render(&request(Role::ControlPlane)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_empty_load_balancer_address_is_rejected() {
    let mut req = request(Role::Worker);
    req.load_balancer_ip = "";
    assert!(matches!(render(&req), Err(ProvisionerError::MachineConfig(_))));
}

#[test]
fn test_role_names() {
    assert_eq!(Role::ControlPlane.node_name(0), "control-plane-0");
    assert_eq!(Role::Worker.node_name(1), "worker-1");
    assert_eq!(Role::ControlPlane.to_string(), "controlplane");
    assert_eq!(serde_json::to_value(Role::ControlPlane).unwrap(), json!("controlplane"));
}
