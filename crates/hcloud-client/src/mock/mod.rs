//! Mock HcloudClient for unit testing
//!
//! This module provides a mock implementation of HcloudClientTrait that can be used
//! in unit tests without a Hetzner Cloud project.
//!
//! The mock is organized into domain-specific modules:
//! - `servers.rs` - server operations
//! - `load_balancers.rs` - load balancers, services and label targets
//! - `helpers.rs` - helper functions for building nested model types

mod helpers;
mod load_balancers;
mod servers;

use crate::error::HcloudError;
use crate::hcloud_trait::HcloudClientTrait;
use crate::models::*;
use crate::selector::LabelSelector;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock HcloudClient for testing
///
/// Stores servers and load balancers in memory, records every mutating call
/// and can be told to fail specific operations.
#[derive(Clone)]
pub struct MockHcloudClient {
    pub(crate) base_url: String,
    // In-memory storage for resources
    pub(crate) servers: Arc<Mutex<HashMap<u64, Server>>>,
    pub(crate) load_balancers: Arc<Mutex<HashMap<u64, LoadBalancer>>>,
    // Mutating calls in order, e.g. "create_server:worker-0"
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
    // Operation names that return an API error
    pub(crate) failing: Arc<Mutex<HashSet<String>>>,
    // Counter for generating IDs
    pub(crate) next_id: Arc<Mutex<u64>>,
    // When set, deleted servers linger as "deleting" until their action is polled
    pub(crate) deferred_deletes: Arc<Mutex<bool>>,
    // Running delete actions: action id -> server id
    pub(crate) pending_deletes: Arc<Mutex<HashMap<u64, u64>>>,
}

impl MockHcloudClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self {
            base_url: "https://api.hetzner.cloud/v1".to_string(),
            servers: Arc::new(Mutex::new(HashMap::new())),
            load_balancers: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
            next_id: Arc::new(Mutex::new(1)),
            deferred_deletes: Arc::new(Mutex::new(false)),
            pending_deletes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Finish server deletions asynchronously, like the real API: the server
    /// stays listed with status `deleting` until its action is polled.
    pub fn defer_deletes(&self) {
        *self.deferred_deletes.lock().unwrap() = true;
    }

    /// Add a server to the mock store (for test setup)
    pub fn add_server(&self, server: Server) {
        self.servers.lock().unwrap().insert(server.id, server);
    }

    /// Overwrite the labels of an existing server (simulates out-of-band relabeling)
    pub fn set_server_labels(&self, id: u64, labels: Labels) {
        if let Some(server) = self.servers.lock().unwrap().get_mut(&id) {
            server.labels = labels;
        }
    }

    /// Make every call of `operation` fail with an API error
    pub fn fail_on(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    /// Stop failing `operation`
    pub fn clear_failure(&self, operation: &str) {
        self.failing.lock().unwrap().remove(operation);
    }

    /// Mutating calls recorded so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls whose name starts with `prefix`
    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// All servers currently stored, sorted by id
    pub fn servers(&self) -> Vec<Server> {
        let mut servers: Vec<Server> = self.servers.lock().unwrap().values().cloned().collect();
        servers.sort_by_key(|s| s.id);
        servers
    }

    /// Names of the servers a load balancer currently forwards to.
    ///
    /// Label-selector targets are evaluated against the servers' current labels
    /// at call time, so relabeled or newly created servers are picked up.
    pub fn resolved_targets(&self, load_balancer_id: u64) -> Vec<String> {
        load_balancers::resolved_targets(self, load_balancer_id)
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }

    /// Record a call, failing if the operation was marked as failing
    pub(crate) fn record(&self, operation: &str, detail: &str) -> Result<(), HcloudError> {
        self.calls.lock().unwrap().push(format!("{}:{}", operation, detail));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(HcloudError::Api(format!("{} {} failed: injected", operation, detail)));
        }
        Ok(())
    }

    /// Get helpers instance
    pub(crate) fn helpers(&self) -> helpers::Helpers {
        helpers::Helpers::new(self.next_id())
    }
}

impl Default for MockHcloudClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HcloudClientTrait for MockHcloudClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn validate_token(&self) -> Result<(), HcloudError> {
        if self.failing.lock().unwrap().contains("validate_token") {
            return Err(HcloudError::Authentication("invalid token".to_string()));
        }
        Ok(())
    }

    // Servers - delegated to servers module
    async fn list_servers(&self, selector: Option<&LabelSelector>) -> Result<Vec<Server>, HcloudError> {
        servers::list_servers(self, selector).await
    }

    async fn get_server(&self, id: u64) -> Result<Server, HcloudError> {
        servers::get_server(self, id).await
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>, HcloudError> {
        servers::get_server_by_name(self, name).await
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreateServerResponse, HcloudError> {
        servers::create_server(self, request).await
    }

    async fn delete_server(&self, id: u64) -> Result<Action, HcloudError> {
        servers::delete_server(self, id).await
    }

    // Load balancers - delegated to load_balancers module
    async fn get_load_balancer(&self, id: u64) -> Result<LoadBalancer, HcloudError> {
        load_balancers::get_load_balancer(self, id).await
    }

    async fn get_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, HcloudError> {
        load_balancers::get_load_balancer_by_name(self, name).await
    }

    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> Result<CreateLoadBalancerResponse, HcloudError> {
        load_balancers::create_load_balancer(self, request).await
    }

    async fn add_service(&self, load_balancer_id: u64, service: &LoadBalancerService) -> Result<Action, HcloudError> {
        load_balancers::add_service(self, load_balancer_id, service).await
    }

    async fn add_label_target(&self, load_balancer_id: u64, selector: &LabelSelector) -> Result<Action, HcloudError> {
        load_balancers::add_label_target(self, load_balancer_id, selector).await
    }

    async fn delete_load_balancer(&self, id: u64) -> Result<(), HcloudError> {
        load_balancers::delete_load_balancer(self, id).await
    }

    async fn get_action(&self, id: u64) -> Result<Action, HcloudError> {
        servers::poll_action(self, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(name: &str, role: &str) -> CreateServerRequest {
        CreateServerRequest {
            name: name.to_string(),
            server_type: "cax11".to_string(),
            image: "160372084".to_string(),
            location: "fsn1".to_string(),
            user_data: Some("machine: {}".to_string()),
            labels: BTreeMap::from([("type".to_string(), role.to_string())]),
            start_after_create: true,
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_server() {
        let client = MockHcloudClient::new();
        let created = client.create_server(&request("worker-0", "worker")).await.unwrap();
        assert_eq!(created.server.location(), "fsn1");
        assert!(created.server.ipv4().is_some());

        let found = client.get_server_by_name("worker-0").await.unwrap().unwrap();
        assert_eq!(found.id, created.server.id);
        assert!(client.get_server_by_name("worker-1").await.unwrap().is_none());
        assert_eq!(client.call_count("create_server"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_server_name_conflicts() {
        let client = MockHcloudClient::new();
        client.create_server(&request("worker-0", "worker")).await.unwrap();
        let err = client.create_server(&request("worker-0", "worker")).await.unwrap_err();
        assert!(matches!(err, HcloudError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_label_target_tracks_current_labels() {
        let client = MockHcloudClient::new();
        let lb = client
            .create_load_balancer(&CreateLoadBalancerRequest {
                name: "controlplane".to_string(),
                load_balancer_type: "lb11".to_string(),
                location: "fsn1".to_string(),
                labels: Labels::new(),
            })
            .await
            .unwrap()
            .load_balancer;
        client
            .add_label_target(lb.id, &LabelSelector::equals("type", "controlplane"))
            .await
            .unwrap();
        assert!(client.resolved_targets(lb.id).is_empty());

        let cp = client.create_server(&request("controlplane-0", "controlplane")).await.unwrap();
        client.create_server(&request("worker-0", "worker")).await.unwrap();
        assert_eq!(client.resolved_targets(lb.id), vec!["controlplane-0".to_string()]);

        client.set_server_labels(cp.server.id, BTreeMap::from([("type".to_string(), "retired".to_string())]));
        assert!(client.resolved_targets(lb.id).is_empty());
    }

    #[tokio::test]
    async fn test_deferred_delete_finishes_when_polled() {
        let client = MockHcloudClient::new();
        client.defer_deletes();
        let created = client.create_server(&request("worker-0", "worker")).await.unwrap();

        let action = client.delete_server(created.server.id).await.unwrap();
        assert_eq!(action.status, ActionStatus::Running);
        let lingering = client.get_server_by_name("worker-0").await.unwrap().unwrap();
        assert_eq!(lingering.status, "deleting");

        let finished = client.get_action(action.id).await.unwrap();
        assert_eq!(finished.status, ActionStatus::Success);
        assert!(client.get_server_by_name("worker-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let client = MockHcloudClient::new();
        client.fail_on("create_server");
        assert!(client.create_server(&request("worker-0", "worker")).await.is_err());
        assert!(client.servers().is_empty());

        client.clear_failure("create_server");
        assert!(client.create_server(&request("worker-0", "worker")).await.is_ok());
    }
}
