//! Chart releases through the helm CLI

use crate::error::AddonError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// A chart release to converge with `helm upgrade --install`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    pub name: String,
    pub chart: String,
    pub repo: String,
    pub namespace: String,
    #[serde(default)]
    pub create_namespace: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub values: Value,
}

impl HelmRelease {
    pub fn new(name: &str, chart: &str, repo: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            chart: chart.to_string(),
            repo: repo.to_string(),
            namespace: namespace.to_string(),
            create_namespace: false,
            version: None,
            values: Value::Object(Default::default()),
        }
    }

    pub fn create_namespace(mut self) -> Self {
        self.create_namespace = true;
        self
    }

    pub fn values(mut self, values: Value) -> Self {
        self.values = values;
        self
    }

    fn install_args(&self, values_file: &Path) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.name.clone(),
            self.chart.clone(),
            "--repo".to_string(),
            self.repo.clone(),
            "--namespace".to_string(),
            self.namespace.clone(),
            "--values".to_string(),
            values_file.to_string_lossy().to_string(),
        ];
        if self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(version) = &self.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        args
    }
}

/// Chart release operations used by the add-on resources
#[async_trait::async_trait]
pub trait HelmTrait: Send + Sync {
    async fn upgrade_install(&self, release: &HelmRelease) -> Result<(), AddonError>;

    /// Remove a release; an unknown release counts as removed
    async fn uninstall(&self, name: &str, namespace: &str) -> Result<(), AddonError>;
}

/// Drives the `helm` binary against the published kubeconfig
#[derive(Debug)]
pub struct HelmCli {
    binary: String,
    kubeconfig: TempFile,
}

impl HelmCli {
    pub async fn new(binary: impl Into<String>, kubeconfig: &str) -> Result<Self, AddonError> {
        Ok(Self {
            binary: binary.into(),
            kubeconfig: TempFile::write("kubeconfig", kubeconfig).await?,
        })
    }

    async fn run(&self, args: &[String]) -> Result<String, AddonError> {
        let command = args.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
        debug!("Running {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .arg("--kubeconfig")
            .arg(self.kubeconfig.path())
            .args(args)
            .output()
            .await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        Err(AddonError::Helm {
            command,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait::async_trait]
impl HelmTrait for HelmCli {
    async fn upgrade_install(&self, release: &HelmRelease) -> Result<(), AddonError> {
        let values = TempFile::write("values", &serde_yaml::to_string(&release.values)?).await?;
        info!("Installing chart {} as {} in {}", release.chart, release.name, release.namespace);
        self.run(&release.install_args(values.path())).await?;
        Ok(())
    }

    async fn uninstall(&self, name: &str, namespace: &str) -> Result<(), AddonError> {
        info!("Uninstalling release {} from {}", name, namespace);
        let args = ["uninstall", name, "--namespace", namespace, "--ignore-not-found"].map(str::to_string);
        self.run(&args).await?;
        Ok(())
    }
}

/// Owner-only temporary file, removed on drop
#[derive(Debug)]
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    async fn write(prefix: &str, contents: &str) -> Result<Self, AddonError> {
        let path = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        let file = Self { path };
        tokio::fs::write(&file.path, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&file.path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        Ok(file)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
