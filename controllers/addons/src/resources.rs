//! Resource providers of the add-on graph

use crate::cluster::{ClusterApiTrait, ManifestRef};
use crate::helm::{HelmRelease, HelmTrait};
use crate::manifests::{grafana_admin_secret, to_manifest};
use hcloud_client::HcloudClientTrait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use resource_graph::{GraphError, Lifecycle, ProviderError, Reaper, Resolved, Resource, ResourceId, ResourceRecord};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

pub type SharedCluster = Arc<dyn ClusterApiTrait>;
pub type SharedHelm = Arc<dyn HelmTrait>;
pub type SharedHcloud = Arc<dyn HcloudClientTrait>;

pub use hcloud_client::{LoadBalancerOutputs, LoadBalancerResource, KIND_LOAD_BALANCER};

pub const KIND_MANIFEST: &str = "manifest";
pub const KIND_RELEASE: &str = "release";
pub const KIND_CREDENTIAL: &str = "credential";

const PASSWORD_LENGTH: usize = 32;

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, ProviderError> {
    Ok(serde_json::from_value(value.clone())?)
}

/// An object kept applied with server-side apply
pub struct ManifestResource {
    cluster: SharedCluster,
    manifest: Value,
}

impl ManifestResource {
    pub fn new(cluster: SharedCluster, manifest: Value) -> Self {
        Self { cluster, manifest }
    }
}

async fn apply(cluster: &SharedCluster, manifest: &Value) -> Result<Value, ProviderError> {
    let target = ManifestRef::from_manifest(manifest)?;
    cluster.apply(manifest).await?;
    Ok(serde_json::to_value(target)?)
}

#[async_trait::async_trait]
impl Resource for ManifestResource {
    fn inputs(&self, _upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        Ok(self.manifest.clone())
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        apply(&self.cluster, inputs).await
    }
}

/// Deletes objects of add-ons that are no longer selected
pub struct ManifestReaper {
    cluster: SharedCluster,
}

impl ManifestReaper {
    pub fn new(cluster: SharedCluster) -> Self {
        Self { cluster }
    }
}

#[async_trait::async_trait]
impl Reaper for ManifestReaper {
    async fn delete(&self, record: &ResourceRecord) -> Result<(), ProviderError> {
        let target: ManifestRef = decode(&record.outputs)?;
        self.cluster.delete(&target).await?;
        Ok(())
    }
}

/// A chart release kept at its declared values
pub struct ReleaseResource {
    helm: SharedHelm,
    release: HelmRelease,
}

impl ReleaseResource {
    pub fn new(helm: SharedHelm, release: HelmRelease) -> Self {
        Self { helm, release }
    }
}

#[async_trait::async_trait]
impl Resource for ReleaseResource {
    fn inputs(&self, _upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        Ok(serde_json::to_value(&self.release)?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        let release: HelmRelease = decode(inputs)?;
        self.helm.upgrade_install(&release).await?;
        Ok(json!({"name": release.name, "namespace": release.namespace}))
    }
}

pub struct ReleaseReaper {
    helm: SharedHelm,
}

impl ReleaseReaper {
    pub fn new(helm: SharedHelm) -> Self {
        Self { helm }
    }
}

#[async_trait::async_trait]
impl Reaper for ReleaseReaper {
    async fn delete(&self, record: &ResourceRecord) -> Result<(), ProviderError> {
        let name = record.outputs["name"].as_str().unwrap_or_default();
        let namespace = record.outputs["namespace"].as_str().unwrap_or_default();
        if name.is_empty() || namespace.is_empty() {
            return Err(format!("{} has no recorded release", record.id).into());
        }
        self.helm.uninstall(name, namespace).await?;
        Ok(())
    }
}

/// A random administrator credential, generated once and kept in state
pub struct CredentialResource {
    username: String,
}

impl CredentialResource {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

#[async_trait::async_trait]
impl Resource for CredentialResource {
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::create_only()
    }

    fn inputs(&self, _upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        Ok(json!({"username": self.username, "length": PASSWORD_LENGTH}))
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        let password: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PASSWORD_LENGTH)
            .map(char::from)
            .collect();
        Ok(json!({"username": inputs["username"], "password": password}))
    }
}

/// The dashboards admin secret, filled from a credential resource
pub struct AdminSecretResource {
    cluster: SharedCluster,
    credential: ResourceId,
    namespace: String,
}

impl AdminSecretResource {
    pub fn new(cluster: SharedCluster, credential: ResourceId, namespace: impl Into<String>) -> Self {
        Self {
            cluster,
            credential,
            namespace: namespace.into(),
        }
    }
}

#[async_trait::async_trait]
impl Resource for AdminSecretResource {
    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError> {
        let username = upstream.string(&self.credential, "/username")?;
        let password = upstream.string(&self.credential, "/password")?;
        Ok(to_manifest(&grafana_admin_secret(&self.namespace, &username, &password))?)
    }

    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError> {
        apply(&self.cluster, inputs).await
    }
}
