//! talosctl-backed management-plane client

use crate::error::TalosError;
use crate::models::{ClientConfiguration, TalosConfig};
use crate::talos_trait::MachineApiTrait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// stderr fragments that mean the request never reached the node
const TRANSPORT_ERRORS: &[&str] = &[
    "connection refused",
    "i/o timeout",
    "no route to host",
    "connection reset",
    "code = Unavailable",
    "context deadline exceeded",
];

/// Client that shells out to `talosctl`
#[derive(Debug, Clone)]
pub struct TalosctlClient {
    binary: String,
    context: String,
    attempts: u32,
    retry_delay: Duration,
}

impl TalosctlClient {
    /// Create a client using the given talosctl binary
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            context: "talos".to_string(),
            attempts: 1,
            retry_delay: Duration::from_secs(10),
        }
    }

    /// Name of the talosconfig context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Retry requests that did not reach the node (freshly booted servers)
    pub fn with_retries(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn run(
        &self,
        identity: &ClientConfiguration,
        endpoint: &str,
        node: &str,
        args: &[&str],
    ) -> Result<String, TalosError> {
        if endpoint.is_empty() || node.is_empty() {
            return Err(TalosError::InvalidRequest("node address is empty".to_string()));
        }

        let talosconfig = TalosConfig::new(
            &self.context,
            identity,
            vec![endpoint.to_string()],
            vec![node.to_string()],
        );
        let config_file = TempFile::write("talosconfig", &talosconfig.to_yaml()?).await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run_once(config_file.path(), endpoint, node, args).await {
                Err(e) if e.is_transport() && attempt < self.attempts => {
                    warn!(
                        "talosctl {} against {} failed (attempt {}/{}): {}",
                        args.first().copied().unwrap_or_default(),
                        node,
                        attempt,
                        self.attempts,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                result => return result,
            }
        }
    }

    async fn run_once(
        &self,
        talosconfig: &Path,
        endpoint: &str,
        node: &str,
        args: &[&str],
    ) -> Result<String, TalosError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Running {} against {}", command, node);

        let output = Command::new(&self.binary)
            .arg("--talosconfig")
            .arg(talosconfig)
            .args(["--endpoints", endpoint, "--nodes", node])
            .args(args)
            .output()
            .await?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }

        let message = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let subcommand = args.first().copied().unwrap_or_default();
        Err(classify(subcommand, command, node, message))
    }
}

#[async_trait::async_trait]
impl MachineApiTrait for TalosctlClient {
    async fn apply_configuration(
        &self,
        identity: &ClientConfiguration,
        node: &str,
        machine_config: &str,
    ) -> Result<(), TalosError> {
        let file = TempFile::write("machineconfig", machine_config).await?;
        let path = file.path().to_string_lossy().to_string();
        self.run(identity, node, node, &["apply-config", "--file", &path]).await?;
        Ok(())
    }

    async fn bootstrap(&self, identity: &ClientConfiguration, node: &str) -> Result<(), TalosError> {
        self.run(identity, node, node, &["bootstrap"]).await?;
        Ok(())
    }

    async fn kubeconfig(&self, identity: &ClientConfiguration, endpoint: &str, node: &str) -> Result<String, TalosError> {
        let file = TempFile::write("kubeconfig", "").await?;
        let path = file.path().to_string_lossy().to_string();
        self.run(identity, endpoint, node, &["kubeconfig", &path, "--force", "--merge=false"])
            .await?;
        Ok(tokio::fs::read_to_string(file.path()).await?)
    }
}

/// Map a failed invocation to an error. Only `bootstrap` can report an
/// already bootstrapped node.
fn classify(subcommand: &str, command: String, node: &str, message: String) -> TalosError {
    if subcommand == "bootstrap"
        && (message.contains("AlreadyExists") || message.contains("etcd data directory is not empty"))
    {
        return TalosError::AlreadyBootstrapped(node.to_string());
    }
    if TRANSPORT_ERRORS.iter().any(|fragment| message.contains(fragment)) {
        return TalosError::Unreachable {
            node: node.to_string(),
            message,
        };
    }
    TalosError::CommandFailed { command, message }
}

/// Owner-only temporary file, removed on drop
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    async fn write(prefix: &str, contents: &str) -> Result<Self, TalosError> {
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
