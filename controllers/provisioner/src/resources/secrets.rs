//! Cluster identity provider

use crate::identity::ClusterSecrets;
use resource_graph::{GraphError, Lifecycle, ProviderError, Resolved, Resource};
use serde_json::{json, Value};

/// Generates the cluster identity once; it is never rotated afterwards
pub struct SecretsResource {
    cluster_name: String,
}

impl SecretsResource {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }
}

#[async_trait::async_trait]
impl Resource for SecretsResource {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::create_only()
    }

    fn inputs(&self, _upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        Ok(json!({"clusterName": self.cluster_name}))
    }

    async fn create(&self, _inputs: &Value) -> Result<Value, ProviderError> {
        let secrets = ClusterSecrets::generate(&self.cluster_name)?;
        Ok(serde_json::to_value(secrets)?)
    }
}
