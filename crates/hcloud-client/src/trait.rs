//! HcloudClient trait for mocking
//!
//! This trait abstracts the HcloudClient to enable mocking in unit tests.
//! The concrete HcloudClient implements this trait, and tests can use the mock.

use crate::error::HcloudError;
use crate::models::*;
use crate::selector::LabelSelector;

/// Trait for Hetzner Cloud API client operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait HcloudClientTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Validate the API token
    async fn validate_token(&self) -> Result<(), HcloudError>;

    // Servers
    async fn list_servers(&self, selector: Option<&LabelSelector>) -> Result<Vec<Server>, HcloudError>;
    async fn get_server(&self, id: u64) -> Result<Server, HcloudError>;
    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>, HcloudError>;
    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreateServerResponse, HcloudError>;
    async fn delete_server(&self, id: u64) -> Result<Action, HcloudError>;

    // Load balancers
    async fn get_load_balancer(&self, id: u64) -> Result<LoadBalancer, HcloudError>;
    async fn get_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, HcloudError>;
    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> Result<CreateLoadBalancerResponse, HcloudError>;
    async fn add_service(&self, load_balancer_id: u64, service: &LoadBalancerService) -> Result<Action, HcloudError>;
    async fn add_label_target(&self, load_balancer_id: u64, selector: &LabelSelector) -> Result<Action, HcloudError>;
    async fn delete_load_balancer(&self, id: u64) -> Result<(), HcloudError>;

    // Actions
    async fn get_action(&self, id: u64) -> Result<Action, HcloudError>;
}
