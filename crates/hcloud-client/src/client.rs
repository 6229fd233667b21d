//! Hetzner Cloud API client
//!
//! Implements the REST client for servers, load balancers and actions.
//! Based on the API structure: /v1/servers, /v1/load_balancers, /v1/actions

use crate::common::HttpClient;
use crate::error::HcloudError;
use crate::hcloud_trait::HcloudClientTrait;
use crate::models::*;
use crate::selector::LabelSelector;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Default API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.hetzner.cloud/v1";

/// Hetzner Cloud API client
pub struct HcloudClient {
    http: HttpClient,
}

impl HcloudClient {
    /// Create a new Hetzner Cloud client
    ///
    /// # Arguments
    /// * `base_url` - API base URL (e.g., "https://api.hetzner.cloud/v1")
    /// * `token` - project API token
    pub fn new(base_url: String, token: String) -> Result<Self, HcloudError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http: HttpClient::new(client, base_url, token),
        })
    }

    /// Create a client against the public API endpoint
    pub fn with_token(token: String) -> Result<Self, HcloudError> {
        Self::new(DEFAULT_BASE_URL.to_string(), token)
    }

    async fn find_by_name<P, T, F>(&self, path: &str, name: &str, extract: F) -> Result<Option<T>, HcloudError>
    where
        P: for<'de> serde::Deserialize<'de>,
        F: Fn(P) -> Vec<T>,
    {
        let query = self.http.build_query_string(&[("name", name)]);
        let found: P = self.http.get(&format!("{}?{}", path, query)).await?;
        Ok(extract(found).into_iter().next())
    }
}

#[async_trait::async_trait]
impl HcloudClientTrait for HcloudClient {
    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Validate the API token by making a lightweight authenticated request.
    ///
    /// # Returns
    /// * `Ok(())` - Token is valid and the API is reachable
    /// * `Err(HcloudError::Authentication)` - Token is invalid
    async fn validate_token(&self) -> Result<(), HcloudError> {
        debug!("Validating Hetzner Cloud token and connectivity");
        let _: serde_json::Value = self.http.get("/locations?per_page=1").await?;
        debug!("Token validated successfully");
        Ok(())
    }

    async fn list_servers(&self, selector: Option<&LabelSelector>) -> Result<Vec<Server>, HcloudError> {
        let path = match selector {
            Some(selector) => format!(
                "/servers?{}",
                self.http.build_query_string(&[("label_selector", selector.as_str())])
            ),
            None => "/servers".to_string(),
        };
        self.http.get_all(&path, |list: ServerList| list.servers).await
    }

    async fn get_server(&self, id: u64) -> Result<Server, HcloudError> {
        let response: ServerResponse = self.http.get(&format!("/servers/{}", id)).await?;
        Ok(response.server)
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>, HcloudError> {
        self.find_by_name("/servers", name, |list: ServerList| list.servers).await
    }

    async fn create_server(&self, request: &CreateServerRequest) -> Result<CreateServerResponse, HcloudError> {
        debug!("Creating server {} in {}", request.name, request.location);
        let body = serde_json::to_value(request)?;
        self.http.post("/servers", &body).await
    }

    async fn delete_server(&self, id: u64) -> Result<Action, HcloudError> {
        debug!("Deleting server {}", id);
        let response: ActionResponse = self.http.delete_with_response(&format!("/servers/{}", id)).await?;
        Ok(response.action)
    }

    async fn get_load_balancer(&self, id: u64) -> Result<LoadBalancer, HcloudError> {
        let response: LoadBalancerResponse = self.http.get(&format!("/load_balancers/{}", id)).await?;
        Ok(response.load_balancer)
    }

    async fn get_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, HcloudError> {
        self.find_by_name("/load_balancers", name, |list: LoadBalancerList| list.load_balancers)
            .await
    }

    async fn create_load_balancer(
        &self,
        request: &CreateLoadBalancerRequest,
    ) -> Result<CreateLoadBalancerResponse, HcloudError> {
        debug!("Creating load balancer {} in {}", request.name, request.location);
        let body = serde_json::to_value(request)?;
        self.http.post("/load_balancers", &body).await
    }

    async fn add_service(&self, load_balancer_id: u64, service: &LoadBalancerService) -> Result<Action, HcloudError> {
        let body = serde_json::to_value(service)?;
        let response: ActionResponse = self
            .http
            .post(&format!("/load_balancers/{}/actions/add_service", load_balancer_id), &body)
            .await?;
        Ok(response.action)
    }

    async fn add_label_target(&self, load_balancer_id: u64, selector: &LabelSelector) -> Result<Action, HcloudError> {
        let body = serde_json::to_value(LoadBalancerTarget::label_selector(selector.as_str()))?;
        let response: ActionResponse = self
            .http
            .post(&format!("/load_balancers/{}/actions/add_target", load_balancer_id), &body)
            .await?;
        Ok(response.action)
    }

    async fn delete_load_balancer(&self, id: u64) -> Result<(), HcloudError> {
        self.http.delete(&format!("/load_balancers/{}", id)).await
    }

    async fn get_action(&self, id: u64) -> Result<Action, HcloudError> {
        let response: ActionResponse = self.http.get(&format!("/actions/{}", id)).await?;
        Ok(response.action)
    }
}
