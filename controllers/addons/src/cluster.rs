//! Kubernetes API access for declared manifests
//!
//! Manifests are applied with server-side apply under a fixed field manager,
//! so applying the same manifest again is a no-op on the cluster.

use crate::error::AddonError;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Field manager used for every server-side apply
pub const FIELD_MANAGER: &str = "cluster-addons";

/// Identity of a manifest inside the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ManifestRef {
    /// Read apiVersion, kind, name and namespace from a manifest
    pub fn from_manifest(manifest: &Value) -> Result<Self, AddonError> {
        let field = |pointer: &str| {
            manifest
                .pointer(pointer)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| AddonError::InvalidManifest(format!("missing {}", pointer)))
        };
        Ok(Self {
            api_version: field("/apiVersion")?,
            kind: field("/kind")?,
            name: field("/metadata/name")?,
            namespace: manifest
                .pointer("/metadata/namespace")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = self.api_version.split_once('/').unwrap_or(("", &self.api_version));
        GroupVersionKind::gvk(group, version, &self.kind)
    }
}

impl std::fmt::Display for ManifestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Cluster operations used by the add-on resources
#[async_trait::async_trait]
pub trait ClusterApiTrait: Send + Sync {
    /// Server-side apply one manifest
    async fn apply(&self, manifest: &Value) -> Result<(), AddonError>;

    /// Delete an applied object; a missing object counts as deleted
    async fn delete(&self, target: &ManifestRef) -> Result<(), AddonError>;
}

/// Cluster access through the Kubernetes API
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KubeCluster")
    }
}

impl KubeCluster {
    /// Build a client from a kubeconfig document
    pub async fn from_kubeconfig(kubeconfig: &str) -> Result<Self, AddonError> {
        let kubeconfig: Kubeconfig = serde_yaml::from_str(kubeconfig)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| AddonError::Kubeconfig(e.to_string()))?;
        Ok(Self {
            client: Client::try_from(config)?,
        })
    }

    /// Fail early when the API server cannot be reached with the published credentials
    pub async fn check(&self) -> Result<(), AddonError> {
        let version = self.client.apiserver_version().await?;
        info!("Connected to Kubernetes {}.{}", version.major, version.minor);
        Ok(())
    }

    async fn api(&self, target: &ManifestRef) -> Result<Api<DynamicObject>, AddonError> {
        // Resolved per call: CRDs installed by earlier charts must be visible
        let (resource, _) = kube::discovery::pinned_kind(&self.client, &target.gvk()).await?;
        Ok(match &target.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        })
    }
}

#[async_trait::async_trait]
impl ClusterApiTrait for KubeCluster {
    async fn apply(&self, manifest: &Value) -> Result<(), AddonError> {
        let target = ManifestRef::from_manifest(manifest)?;
        let api = self.api(&target).await?;
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&target.name, &params, &Patch::Apply(manifest)).await?;
        debug!("Applied {}", target);
        Ok(())
    }

    async fn delete(&self, target: &ManifestRef) -> Result<(), AddonError> {
        let api = self.api(target).await?;
        match api.delete(&target.name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted {}", target);
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!("{} already gone", target);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
