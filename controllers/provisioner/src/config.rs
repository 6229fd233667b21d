//! Provisioner configuration from environment variables

use crate::error::ProvisionerError;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CLUSTER_NAME: &str = "talos";
pub const DEFAULT_SERVER_TYPE: &str = "cax11";
pub const DEFAULT_IMAGE_ID: &str = "160372084";
pub const DEFAULT_INSTALL_DISK: &str = "/dev/sda";

/// Everything the provisioning graph is built from
#[derive(Clone)]
pub struct ProvisionerConfig {
    pub hcloud_token: String,
    pub hcloud_endpoint: String,
    pub cluster_name: String,
    pub control_plane_count: usize,
    pub worker_count: usize,
    pub locations: Vec<String>,
    pub server_type: String,
    pub image: String,
    pub install_disk: String,
    pub lb_location: String,
    pub lb_type: String,
    pub state_file: PathBuf,
    pub outputs_file: PathBuf,
    pub talosctl: String,
    /// Re-evaluate on this interval; `None` runs once
    pub reconcile_interval: Option<Duration>,
    pub metrics_addr: SocketAddr,
    pub preview: bool,
}

impl fmt::Debug for ProvisionerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionerConfig")
            .field("hcloud_token", &"<redacted>")
            .field("cluster_name", &self.cluster_name)
            .field("control_plane_count", &self.control_plane_count)
            .field("worker_count", &self.worker_count)
            .field("locations", &self.locations)
            .field("server_type", &self.server_type)
            .field("image", &self.image)
            .field("preview", &self.preview)
            .finish_non_exhaustive()
    }
}

impl ProvisionerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ProvisionerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment in production, maps in tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProvisionerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let hcloud_token = lookup("HCLOUD_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ProvisionerError::InvalidConfig("HCLOUD_TOKEN environment variable is required".to_string())
            })?;

        let locations: Vec<String> = var("LOCATIONS", "fsn1,nbg1")
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if locations.is_empty() {
            return Err(ProvisionerError::InvalidConfig(
                "LOCATIONS must name at least one location".to_string(),
            ));
        }

        let control_plane_count: usize = parse(&lookup, "CONTROL_PLANE_COUNT", 3)?;
        if control_plane_count == 0 {
            return Err(ProvisionerError::InvalidConfig(
                "CONTROL_PLANE_COUNT must be at least 1".to_string(),
            ));
        }

        let reconcile_interval = match lookup("RECONCILE_INTERVAL_SECS") {
            Some(raw) if !raw.is_empty() => {
                let secs: u64 = raw.parse().map_err(|_| {
                    ProvisionerError::InvalidConfig(format!("RECONCILE_INTERVAL_SECS is not a number: {}", raw))
                })?;
                Some(Duration::from_secs(secs.max(1)))
            }
            _ => None,
        };

        Ok(Self {
            hcloud_token,
            hcloud_endpoint: var("HCLOUD_ENDPOINT", hcloud_client::client::DEFAULT_BASE_URL),
            cluster_name: var("CLUSTER_NAME", DEFAULT_CLUSTER_NAME),
            control_plane_count,
            worker_count: parse(&lookup, "WORKER_COUNT", 2)?,
            locations,
            server_type: var("SERVER_TYPE", DEFAULT_SERVER_TYPE),
            image: var("IMAGE_ID", DEFAULT_IMAGE_ID),
            install_disk: var("INSTALL_DISK", DEFAULT_INSTALL_DISK),
            lb_location: var("LB_LOCATION", "fsn1"),
            lb_type: var("LB_TYPE", "lb11"),
            state_file: PathBuf::from(var("STATE_FILE", "state/provisioner.json")),
            outputs_file: PathBuf::from(var("OUTPUTS_FILE", "state/outputs.json")),
            talosctl: var("TALOSCTL", "talosctl"),
            reconcile_interval,
            metrics_addr: parse(&lookup, "METRICS_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            preview: parse_bool(&lookup, "PREVIEW")?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ProvisionerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ProvisionerError::InvalidConfig(format!("{} has an invalid value: {}", key, raw))),
        _ => Ok(default),
    }
}

pub(crate) fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool, ProvisionerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some("1" | "true" | "TRUE" | "True" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "False" | "no") => Ok(false),
        Some(other) => Err(ProvisionerError::InvalidConfig(format!(
            "{} must be true or false, got {}",
            key, other
        ))),
    }
}
