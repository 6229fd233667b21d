//! MachineApiTrait for mocking
//!
//! The concrete TalosctlClient implements this trait, and tests can use the mock.

use crate::error::TalosError;
use crate::models::ClientConfiguration;

/// Management-plane operations against a single node
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait MachineApiTrait: Send + Sync {
    /// Push a machine configuration document to `node`
    async fn apply_configuration(
        &self,
        identity: &ClientConfiguration,
        node: &str,
        machine_config: &str,
    ) -> Result<(), TalosError>;

    /// Bootstrap etcd on `node`
    async fn bootstrap(&self, identity: &ClientConfiguration, node: &str) -> Result<(), TalosError>;

    /// Retrieve the admin kubeconfig of `node`, reached through `endpoint`
    async fn kubeconfig(&self, identity: &ClientConfiguration, endpoint: &str, node: &str) -> Result<String, TalosError>;
}
