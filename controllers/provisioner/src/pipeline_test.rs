use super::*;
use crate::resources::ServerOutputs;
use hcloud_client::{Datacenter, IpAddress, MockHcloudClient, NamedRef, Server, ServerPublicNet};
use resource_graph::{Action, Engine, MemoryStateStore, Report, Status};
use std::collections::HashMap;
use talos_client::{MachineCall, MockMachineApi};

struct Harness {
    hcloud: MockHcloudClient,
    talos: MockMachineApi,
    store: MemoryStateStore,
}

impl Harness {
    fn new() -> Self {
        Self {
            hcloud: MockHcloudClient::new(),
            talos: MockMachineApi::new(),
            store: MemoryStateStore::default(),
        }
    }

    fn pipeline(&self, config: &ProvisionerConfig) -> Pipeline {
        build(config, Arc::new(self.hcloud.clone()), Arc::new(self.talos.clone())).unwrap()
    }

    async fn apply(&self, config: &ProvisionerConfig) -> Report {
        let pipeline = self.pipeline(config);
        Engine::new(self.store.clone()).evaluate(&pipeline.graph).await.unwrap()
    }

    async fn preview(&self, config: &ProvisionerConfig) -> Report {
        let pipeline = self.pipeline(config);
        Engine::preview(self.store.clone()).evaluate(&pipeline.graph).await.unwrap()
    }

    fn recorded(&self, id: &ResourceId) -> Option<resource_graph::ResourceRecord> {
        self.store.snapshot().unwrap().get(id).cloned()
    }

    fn server_ip(&self, name: &str) -> String {
        self.recorded(&ResourceId::new(KIND_SERVER, name)).unwrap().outputs["ipv4"]
            .as_str()
            .unwrap()
            .to_string()
    }
}

fn config_with(pairs: &[(&str, &str)]) -> ProvisionerConfig {
    let mut env: HashMap<String, String> = HashMap::from([("HCLOUD_TOKEN".to_string(), "test-token".to_string())]);
    env.extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    ProvisionerConfig::from_lookup(|key| env.get(key).cloned()).unwrap()
}

fn default_config() -> ProvisionerConfig {
    config_with(&[])
}

fn server(id: &str) -> ResourceId {
    ResourceId::new(KIND_SERVER, id)
}

fn apply_id(name: &str) -> ResourceId {
    ResourceId::new(KIND_CONFIG_APPLY, name)
}

fn seeded_server(id: u64, name: &str, ip: &str, role: Role) -> Server {
    Server {
        id,
        name: name.to_string(),
        status: "running".to_string(),
        public_net: ServerPublicNet {
            ipv4: Some(IpAddress { ip: ip.to_string() }),
            ipv6: None,
        },
        server_type: NamedRef {
            id: None,
            name: "cax11".to_string(),
        },
        datacenter: Datacenter {
            name: "nbg1-dc3".to_string(),
            location: NamedRef {
                id: None,
                name: "nbg1".to_string(),
            },
        },
        image: None,
        labels: Labels::from([("type".to_string(), role.as_str().to_string())]),
        created: String::new(),
    }
}

#[test]
fn test_location_round_robin() {
    let locations = vec!["fsn1".to_string(), "nbg1".to_string()];
    let assigned: Vec<&str> = (0..3).map(|i| location_for(&locations, i).unwrap()).collect();
    assert_eq!(assigned, vec!["fsn1", "nbg1", "fsn1"]);
    assert!(location_for(&[], 0).is_err());
}

#[test]
fn test_graph_shape() {
    let harness = Harness::new();
    let pipeline = harness.pipeline(&default_config());
    let ids = &pipeline.ids;

    assert_eq!(ids.control_planes.len(), 3);
    assert_eq!(ids.workers.len(), 2);
    assert_eq!(ids.applies.len(), 5);
    assert_eq!(ids.bootstrap_target, server("control-plane-0"));

    // The barrier waits on every apply
    let deps = pipeline.graph.dependencies(&ids.bootstrap);
    for apply in &ids.applies {
        assert!(deps.contains(apply), "bootstrap does not wait for {}", apply);
    }
    assert!(deps.contains(&ids.bootstrap_target));
}

#[test]
fn test_control_plane_load_balancer_spec() {
    let spec = control_plane_lb_spec(&default_config());
    assert_eq!(spec.name, "control-plane");
    assert_eq!(spec.load_balancer_type, "lb11");
    assert_eq!(spec.location, "fsn1");
    let ports: Vec<(u16, u16)> = spec.services.iter().map(|s| (s.listen_port, s.destination_port)).collect();
    assert_eq!(ports, vec![(6443, 6443), (50000, 50000)]);
    assert_eq!(spec.targets, vec![TargetBinding::LabelSelector("type=controlplane".to_string())]);
}

#[tokio::test]
async fn test_first_run_provisions_cluster() {
    let harness = Harness::new();
    let report = harness.apply(&default_config()).await;

    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert_eq!(harness.hcloud.call_count("create_load_balancer"), 1);
    assert_eq!(harness.hcloud.call_count("create_server"), 5);
    assert_eq!(harness.talos.apply_count(), 5);

    // Stable names, round-robin locations
    let locations: Vec<String> = (0..3)
        .map(|i| {
            let record = harness.recorded(&server(&format!("control-plane-{}", i))).unwrap();
            record.inputs["location"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(locations, vec!["fsn1", "nbg1", "fsn1"]);

    // Servers carry their role label for the load balancer binding
    let worker = harness.recorded(&server("worker-1")).unwrap();
    assert_eq!(worker.inputs["labels"]["type"], "worker");
    assert_eq!(worker.inputs["location"], "nbg1");

    let kubeconfig = harness.recorded(&ResourceId::new(KIND_KUBECONFIG, "talos")).unwrap();
    assert!(kubeconfig.outputs["kubeconfig"].as_str().unwrap().contains("kind: Config"));
}

#[tokio::test]
async fn test_bootstrap_targets_first_control_plane_after_every_apply() {
    let harness = Harness::new();
    harness.apply(&default_config()).await;

    let cp0 = harness.server_ip("control-plane-0");
    assert_eq!(harness.talos.bootstrap_calls(), vec![cp0]);

    let calls = harness.talos.calls();
    let bootstrap_at = calls
        .iter()
        .position(|call| matches!(call, MachineCall::Bootstrap { .. }))
        .unwrap();
    let last_apply = calls
        .iter()
        .rposition(|call| matches!(call, MachineCall::Apply { .. }))
        .unwrap();
    assert!(last_apply < bootstrap_at);
    assert_eq!(
        calls[..bootstrap_at]
            .iter()
            .filter(|call| matches!(call, MachineCall::Apply { .. }))
            .count(),
        5
    );
}

#[tokio::test]
async fn test_rerun_converges_without_new_calls() {
    let harness = Harness::new();
    let config = default_config();
    harness.apply(&config).await;
    let hcloud_calls = harness.hcloud.calls().len();
    let talos_calls = harness.talos.calls().len();

    let report = harness.apply(&config).await;
    assert!(report.is_success());
    assert_eq!(report.count(Action::Create), 0);
    assert_eq!(report.count(Action::Update), 0);
    assert_eq!(report.count(Action::Replace), 0);
    assert_eq!(harness.hcloud.calls().len(), hcloud_calls);
    assert_eq!(harness.talos.calls().len(), talos_calls);
    assert_eq!(harness.talos.bootstrap_calls().len(), 1);
}

#[tokio::test]
async fn test_config_change_repushes_without_replacing_servers() {
    let harness = Harness::new();
    harness.apply(&default_config()).await;
    let cp0_before = harness.recorded(&server("control-plane-0")).unwrap();

    let changed = config_with(&[("INSTALL_DISK", "/dev/nvme0n1")]);
    let report = harness.apply(&changed).await;

    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert_eq!(harness.hcloud.call_count("create_server"), 5);
    assert_eq!(harness.hcloud.call_count("delete_server"), 0);
    assert_eq!(report.status(&server("control-plane-0")), Some(&Status::Done(Action::Same)));
    assert_eq!(report.status(&apply_id("worker-0")), Some(&Status::Done(Action::Update)));
    assert_eq!(harness.talos.apply_count(), 10);
    assert_eq!(harness.talos.bootstrap_calls().len(), 1);

    // The server record keeps the user data it was created with
    let cp0_after = harness.recorded(&server("control-plane-0")).unwrap();
    assert_eq!(cp0_after.outputs, cp0_before.outputs);
    let node = harness.server_ip("worker-0");
    assert!(harness.talos.applied_config(&node).unwrap().contains("/dev/nvme0n1"));
}

#[tokio::test]
async fn test_failed_apply_blocks_bootstrap_and_resumes() {
    let harness = Harness::new();
    harness
        .hcloud
        .add_server(seeded_server(900, "worker-1", "198.51.100.7", Role::Worker));
    harness.talos.fail_node("198.51.100.7");

    let report = harness.apply(&default_config()).await;
    assert!(!report.is_success());
    assert!(matches!(report.status(&apply_id("worker-1")), Some(Status::Failed(_))));
    let bootstrap = ResourceId::new(KIND_BOOTSTRAP, "talos");
    assert_eq!(report.status(&bootstrap), Some(&Status::Blocked));
    assert!(report.blocked().contains(&&ResourceId::new(KIND_KUBECONFIG, "talos")));
    assert!(harness.talos.bootstrap_calls().is_empty());
    // Sibling branches still completed; the existing worker was adopted
    assert_eq!(report.status(&apply_id("worker-0")), Some(&Status::Done(Action::Create)));
    assert_eq!(harness.hcloud.call_count("create_server"), 4);

    harness.talos.heal_node("198.51.100.7");
    let report = harness.apply(&default_config()).await;
    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert_eq!(report.status(&apply_id("worker-0")), Some(&Status::Done(Action::Same)));
    assert_eq!(harness.talos.bootstrap_calls().len(), 1);
}

#[tokio::test]
async fn test_bootstrap_is_not_reissued_when_servers_are_replaced() {
    let harness = Harness::new();
    harness.apply(&default_config()).await;

    let report = harness.apply(&config_with(&[("IMAGE_ID", "999")])).await;
    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert_eq!(report.count(Action::Replace), 5);
    assert_eq!(harness.hcloud.call_count("delete_server"), 5);
    assert_eq!(harness.hcloud.call_count("create_server"), 10);
    assert_eq!(
        report.status(&ResourceId::new(KIND_BOOTSTRAP, "talos")),
        Some(&Status::Done(Action::Same))
    );
    assert_eq!(harness.talos.bootstrap_calls().len(), 1);
}

#[tokio::test]
async fn test_replacement_waits_for_deletion_before_recreating() {
    let harness = Harness::new();
    harness.hcloud.defer_deletes();
    harness.apply(&default_config()).await;
    let before: ServerOutputs =
        serde_json::from_value(harness.recorded(&server("worker-0")).unwrap().outputs).unwrap();

    let report = harness.apply(&config_with(&[("SERVER_TYPE", "cax21")])).await;
    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert_eq!(report.status(&server("worker-0")), Some(&Status::Done(Action::Replace)));
    assert_eq!(harness.hcloud.call_count("create_server"), 10);

    let after: ServerOutputs =
        serde_json::from_value(harness.recorded(&server("worker-0")).unwrap().outputs).unwrap();
    assert_ne!(before.id, after.id);
    assert!(harness.hcloud.servers().iter().all(|s| s.server_type.name == "cax21"));
    assert_eq!(harness.hcloud.servers().len(), 5);
}

#[tokio::test]
async fn test_server_being_deleted_is_not_adopted() {
    let harness = Harness::new();
    let mut leaving = seeded_server(900, "worker-1", "198.51.100.7", Role::Worker);
    leaving.status = "deleting".to_string();
    harness.hcloud.add_server(leaving);

    let report = harness.apply(&default_config()).await;
    match report.status(&server("worker-1")) {
        Some(Status::Failed(message)) => assert!(message.contains("still being deleted"), "{}", message),
        other => panic!("unexpected status {:?}", other),
    }
    assert!(harness.recorded(&server("worker-1")).is_none());
    assert_eq!(report.status(&ResourceId::new(KIND_BOOTSTRAP, "talos")), Some(&Status::Blocked));
}

#[tokio::test]
async fn test_mismatched_server_is_not_adopted() {
    let harness = Harness::new();
    // Right name, wrong role: the worker selector would never target it
    harness
        .hcloud
        .add_server(seeded_server(900, "worker-1", "198.51.100.7", Role::ControlPlane));

    let report = harness.apply(&default_config()).await;
    match report.status(&server("worker-1")) {
        Some(Status::Failed(message)) => {
            assert!(message.contains("label type=controlplane != worker"), "{}", message)
        }
        other => panic!("unexpected status {:?}", other),
    }
    assert!(harness.talos.calls().iter().all(|call| call.node() != "198.51.100.7"));
}

#[tokio::test]
async fn test_lowering_worker_count_prunes_servers() {
    let harness = Harness::new();
    harness.apply(&default_config()).await;

    let report = harness.apply(&config_with(&[("WORKER_COUNT", "1")])).await;
    assert!(report.is_success());
    assert_eq!(report.pruned, vec![server("worker-1")]);
    assert!(report.orphaned.contains(&apply_id("worker-1")));
    assert_eq!(harness.hcloud.call_count("delete_server"), 1);
    assert!(harness.recorded(&server("worker-1")).is_none());
    assert_eq!(harness.hcloud.servers().len(), 4);
}

#[tokio::test]
async fn test_preview_makes_no_calls() {
    let harness = Harness::new();
    let config = default_config();

    let report = harness.preview(&config).await;
    assert!(report.is_success());
    assert_eq!(
        report.status(&ResourceId::new(KIND_LOAD_BALANCER, "control-plane")),
        Some(&Status::Done(Action::Create))
    );
    assert_eq!(report.status(&server("worker-0")), Some(&Status::Pending));
    assert!(harness.hcloud.calls().is_empty());
    assert!(harness.talos.calls().is_empty());

    harness.apply(&config).await;
    let calls = harness.hcloud.calls().len();
    let report = harness.preview(&config).await;
    assert_eq!(report.count(Action::Create), 0);
    assert_eq!(report.status(&server("worker-0")), Some(&Status::Done(Action::Same)));
    assert_eq!(harness.hcloud.calls().len(), calls);
}

#[tokio::test]
async fn test_load_balancer_failure_blocks_only_its_branch() {
    let harness = Harness::new();
    harness.hcloud.fail_on("create_load_balancer");

    let report = harness.apply(&default_config()).await;
    assert!(matches!(
        report.status(&ResourceId::new(KIND_LOAD_BALANCER, "control-plane")),
        Some(Status::Failed(_))
    ));
    assert_eq!(
        report.status(&ResourceId::new(KIND_SECRETS, "talos")),
        Some(&Status::Done(Action::Create))
    );
    assert_eq!(report.status(&server("control-plane-0")), Some(&Status::Blocked));
    assert_eq!(harness.hcloud.call_count("create_server"), 0);
}

#[tokio::test]
async fn test_identity_is_stable_across_runs() {
    let harness = Harness::new();
    let config = default_config();
    harness.apply(&config).await;
    let first = harness.recorded(&ResourceId::new(KIND_SECRETS, "talos")).unwrap();

    harness.apply(&config_with(&[("WORKER_COUNT", "3")])).await;
    let second = harness.recorded(&ResourceId::new(KIND_SECRETS, "talos")).unwrap();
    assert_eq!(first.outputs, second.outputs);
}

#[tokio::test]
async fn test_lost_state_converges_on_existing_infrastructure() {
    let harness = Harness::new();
    let config = default_config();
    harness.apply(&config).await;

    let fresh = Harness {
        hcloud: harness.hcloud.clone(),
        talos: harness.talos.clone(),
        store: MemoryStateStore::default(),
    };
    let report = fresh.apply(&config).await;
    assert!(report.is_success(), "failures: {:?}", report.failures());
    assert_eq!(harness.hcloud.call_count("create_server"), 5);
    assert_eq!(harness.hcloud.call_count("create_load_balancer"), 1);
}
