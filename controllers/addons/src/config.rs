//! Add-on layer configuration from environment variables
//!
//! The cloud token and the admin kubeconfig are not configured here; they
//! are read from the outputs the provisioner published.

use crate::error::AddonError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How the dashboards administrator credential is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservabilityProfile {
    /// Generate a random admin password, store it in a secret and point the chart at it
    GeneratedCredential,
    /// Leave the chart's own admin credential in place
    ChartDefault,
}

impl FromStr for ObservabilityProfile {
    type Err = AddonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "generated-credential" => Ok(Self::GeneratedCredential),
            "chart-default" => Ok(Self::ChartDefault),
            other => Err(AddonError::InvalidConfig(format!(
                "OBSERVABILITY_PROFILE must be generated-credential or chart-default, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ObservabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeneratedCredential => f.write_str("generated-credential"),
            Self::ChartDefault => f.write_str("chart-default"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddonsConfig {
    pub outputs_file: PathBuf,
    pub state_file: PathBuf,
    pub hcloud_endpoint: String,
    pub enable_cert_manager: bool,
    pub acme_email: Option<String>,
    pub enable_database_operator: bool,
    pub enable_observability: bool,
    pub observability_profile: ObservabilityProfile,
    pub enable_test_workloads: bool,
    /// Host of the test ingress route; TLS is only requested when set
    pub ingress_host: Option<String>,
    pub helm: String,
    pub preview: bool,
}

impl AddonsConfig {
    pub fn from_env() -> Result<Self, AddonError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AddonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let observability_profile = match optional("OBSERVABILITY_PROFILE") {
            Some(raw) => raw.parse()?,
            None => ObservabilityProfile::GeneratedCredential,
        };

        Ok(Self {
            outputs_file: PathBuf::from(var("OUTPUTS_FILE", "state/outputs.json")),
            state_file: PathBuf::from(var("STATE_FILE", "state/addons.json")),
            hcloud_endpoint: var("HCLOUD_ENDPOINT", hcloud_client::client::DEFAULT_BASE_URL),
            enable_cert_manager: flag(&lookup, "ENABLE_CERT_MANAGER")?,
            acme_email: optional("ACME_EMAIL"),
            enable_database_operator: flag(&lookup, "ENABLE_DATABASE_OPERATOR")?,
            enable_observability: flag(&lookup, "ENABLE_OBSERVABILITY")?,
            observability_profile,
            enable_test_workloads: flag(&lookup, "ENABLE_TEST_WORKLOADS")?,
            ingress_host: optional("INGRESS_HOST"),
            helm: var("HELM", "helm"),
            preview: flag(&lookup, "PREVIEW")?,
        })
    }
}

fn flag<F>(lookup: &F, key: &str) -> Result<bool, AddonError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some("1" | "true" | "TRUE" | "True" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "False" | "no") => Ok(false),
        Some(other) => Err(AddonError::InvalidConfig(format!(
            "{} must be true or false, got {}",
            key, other
        ))),
    }
}
