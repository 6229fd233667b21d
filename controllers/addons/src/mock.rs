//! In-memory cluster and helm doubles for tests

use crate::cluster::{ClusterApiTrait, ManifestRef};
use crate::error::AddonError;
use crate::helm::{HelmRelease, HelmTrait};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

/// Records applied objects by `ManifestRef` display name
#[derive(Clone, Default)]
pub struct MockCluster {
    objects: Arc<Mutex<BTreeMap<String, Value>>>,
    applies: Arc<Mutex<Vec<String>>>,
    deletes: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make applies of the named object (e.g. `Ingress/test/whoami-test`) fail
    pub fn fail_on(&self, object: &str) {
        self.failing.lock().unwrap().insert(object.to_string());
    }

    pub fn object(&self, name: &str) -> Option<Value> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn applies(&self) -> Vec<String> {
        self.applies.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClusterApiTrait for MockCluster {
    async fn apply(&self, manifest: &Value) -> Result<(), AddonError> {
        let name = ManifestRef::from_manifest(manifest)?.to_string();
        self.applies.lock().unwrap().push(name.clone());
        if self.failing.lock().unwrap().contains(&name) {
            return Err(AddonError::InvalidManifest(format!("{} rejected: injected", name)));
        }
        self.objects.lock().unwrap().insert(name, manifest.clone());
        Ok(())
    }

    async fn delete(&self, target: &ManifestRef) -> Result<(), AddonError> {
        let name = target.to_string();
        self.objects.lock().unwrap().remove(&name);
        self.deletes.lock().unwrap().push(name);
        Ok(())
    }
}

/// Records installed releases by name
#[derive(Clone, Default)]
pub struct MockHelm {
    releases: Arc<Mutex<BTreeMap<String, HelmRelease>>>,
    installs: Arc<Mutex<Vec<String>>>,
    uninstalls: Arc<Mutex<Vec<String>>>,
}

impl MockHelm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self, name: &str) -> Option<HelmRelease> {
        self.releases.lock().unwrap().get(name).cloned()
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }

    pub fn uninstalls(&self) -> Vec<String> {
        self.uninstalls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HelmTrait for MockHelm {
    async fn upgrade_install(&self, release: &HelmRelease) -> Result<(), AddonError> {
        self.installs.lock().unwrap().push(release.name.clone());
        self.releases.lock().unwrap().insert(release.name.clone(), release.clone());
        Ok(())
    }

    async fn uninstall(&self, name: &str, _namespace: &str) -> Result<(), AddonError> {
        self.releases.lock().unwrap().remove(name);
        self.uninstalls.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
