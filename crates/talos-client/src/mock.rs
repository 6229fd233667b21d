//! Mock MachineApi for unit testing
//!
//! Records every call in order so tests can assert on sequencing
//! (all configuration pushes before the single bootstrap).

use crate::error::TalosError;
use crate::models::ClientConfiguration;
use crate::talos_trait::MachineApiTrait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One recorded management-plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineCall {
    Apply { node: String, config: String },
    Bootstrap { node: String },
    Kubeconfig { node: String },
}

impl MachineCall {
    pub fn node(&self) -> &str {
        match self {
            MachineCall::Apply { node, .. }
            | MachineCall::Bootstrap { node }
            | MachineCall::Kubeconfig { node } => node,
        }
    }
}

/// Mock management plane
#[derive(Clone, Default)]
pub struct MockMachineApi {
    calls: Arc<Mutex<Vec<MachineCall>>>,
    // Nodes whose configuration push fails
    failing_nodes: Arc<Mutex<HashSet<String>>>,
    // Node address -> last applied config
    applied: Arc<Mutex<HashMap<String, String>>>,
    bootstrapped: Arc<Mutex<HashSet<String>>>,
}

impl MockMachineApi {
    /// Create a new mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Make configuration pushes to `node` fail
    pub fn fail_node(&self, node: &str) {
        self.failing_nodes.lock().unwrap().insert(node.to_string());
    }

    /// Let configuration pushes to `node` succeed again
    pub fn heal_node(&self, node: &str) {
        self.failing_nodes.lock().unwrap().remove(node);
    }

    /// All calls in the order they were made
    pub fn calls(&self) -> Vec<MachineCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Nodes that received a bootstrap call, in order
    pub fn bootstrap_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MachineCall::Bootstrap { node } => Some(node),
                _ => None,
            })
            .collect()
    }

    /// Number of configuration pushes
    pub fn apply_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MachineCall::Apply { .. }))
            .count()
    }

    /// Last configuration applied to `node`
    pub fn applied_config(&self, node: &str) -> Option<String> {
        self.applied.lock().unwrap().get(node).cloned()
    }
}

#[async_trait::async_trait]
impl MachineApiTrait for MockMachineApi {
    async fn apply_configuration(
        &self,
        _identity: &ClientConfiguration,
        node: &str,
        machine_config: &str,
    ) -> Result<(), TalosError> {
        self.calls.lock().unwrap().push(MachineCall::Apply {
            node: node.to_string(),
            config: machine_config.to_string(),
        });
        if self.failing_nodes.lock().unwrap().contains(node) {
            return Err(TalosError::CommandFailed {
                command: "talosctl apply-config".to_string(),
                message: format!("injected failure for {}", node),
            });
        }
        self.applied
            .lock()
            .unwrap()
            .insert(node.to_string(), machine_config.to_string());
        Ok(())
    }

    async fn bootstrap(&self, _identity: &ClientConfiguration, node: &str) -> Result<(), TalosError> {
        self.calls.lock().unwrap().push(MachineCall::Bootstrap { node: node.to_string() });
        if !self.bootstrapped.lock().unwrap().insert(node.to_string()) {
            return Err(TalosError::AlreadyBootstrapped(node.to_string()));
        }
        Ok(())
    }

    async fn kubeconfig(&self, _identity: &ClientConfiguration, endpoint: &str, node: &str) -> Result<String, TalosError> {
        self.calls.lock().unwrap().push(MachineCall::Kubeconfig { node: node.to_string() });
        Ok(format!(
            "apiVersion: v1\nkind: Config\nclusters:\n- name: talos\n  cluster:\n    server: https://{}:6443\n",
            endpoint
        ))
    }
}
