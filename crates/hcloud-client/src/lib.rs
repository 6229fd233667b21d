//! Hetzner Cloud REST API Client
//!
//! A Rust client for the parts of the Hetzner Cloud API a cluster needs:
//! servers and load balancers whose backends are bound by label selector.
//!
//! # Example
//!
//! ```no_run
//! use hcloud_client::{HcloudClient, HcloudClientTrait, CreateServerRequest, LabelSelector};
//! use std::collections::BTreeMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HcloudClient::new(
//!     "https://api.hetzner.cloud/v1".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! // Look a server up by its stable name before creating it
//! if client.get_server_by_name("worker-0").await?.is_none() {
//!     let request = CreateServerRequest {
//!         name: "worker-0".to_string(),
//!         server_type: "cax11".to_string(),
//!         image: "160372084".to_string(),
//!         location: "fsn1".to_string(),
//!         user_data: None,
//!         labels: BTreeMap::from([("type".to_string(), "worker".to_string())]),
//!         start_after_create: true,
//!     };
//!     client.create_server(&request).await?;
//! }
//!
//! // Every server currently carrying the label
//! let workers = client.list_servers(Some(&LabelSelector::parse("type=worker")?)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Servers**: create, look up by name, list by label selector, delete
//! - **Load Balancers**: create, add services, bind targets by label selector, delete
//! - **Actions**: poll asynchronous actions until they finish
//! - **Ensure**: converge a load balancer to a declared spec without duplicate requests
//! - **Graph provider** (`graph` feature): the load balancer as a `resource-graph` resource

pub mod client;
pub mod common;
pub mod ensure;
pub mod error;
pub mod models;
pub mod selector;
#[path = "trait.rs"]
pub mod hcloud_trait;
pub mod wait;
#[cfg(feature = "test-util")]
pub mod mock;
#[cfg(feature = "graph")]
pub mod provider;

pub use client::HcloudClient;
pub use common::HttpClient;
pub use ensure::{ensure_load_balancer, LoadBalancerSpec, TargetBinding};
pub use error::HcloudError;
pub use models::*;
pub use selector::LabelSelector;
pub use hcloud_trait::HcloudClientTrait;
pub use wait::wait_for_action;
#[cfg(feature = "test-util")]
pub use mock::MockHcloudClient;
#[cfg(feature = "graph")]
pub use provider::{LoadBalancerOutputs, LoadBalancerResource, KIND_LOAD_BALANCER};
