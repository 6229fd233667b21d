//! Client identity and talosconfig models

use crate::error::TalosError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Client credentials for the management plane.
///
/// PEM documents, base64-encoded as they appear in machine configuration
/// and talosconfig files.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfiguration {
    pub ca_certificate: String,
    pub client_certificate: String,
    pub client_key: String,
}

impl std::fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("ca_certificate", &self.ca_certificate)
            .field("client_certificate", &self.client_certificate)
            .field("client_key", &"<redacted>")
            .finish()
    }
}

impl ClientConfiguration {
    /// Build from PEM documents
    pub fn from_pem(ca_pem: &str, cert_pem: &str, key_pem: &str) -> Self {
        Self {
            ca_certificate: STANDARD.encode(ca_pem),
            client_certificate: STANDARD.encode(cert_pem),
            client_key: STANDARD.encode(key_pem),
        }
    }
}

/// One talosconfig context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalosContext {
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<String>,
    pub ca: String,
    pub crt: String,
    pub key: String,
}

/// talosctl client configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalosConfig {
    pub context: String,
    pub contexts: BTreeMap<String, TalosContext>,
}

impl TalosConfig {
    /// Single-context configuration
    pub fn new(context: &str, identity: &ClientConfiguration, endpoints: Vec<String>, nodes: Vec<String>) -> Self {
        let ctx = TalosContext {
            endpoints,
            nodes,
            ca: identity.ca_certificate.clone(),
            crt: identity.client_certificate.clone(),
            key: identity.client_key.clone(),
        };
        Self {
            context: context.to_string(),
            contexts: BTreeMap::from([(context.to_string(), ctx)]),
        }
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String, TalosError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_talosconfig_yaml() {
        let identity = ClientConfiguration::from_pem("CA", "CRT", "KEY");
        let config = TalosConfig::new(
            "talos",
            &identity,
            vec!["203.0.113.1".to_string()],
            vec!["203.0.113.10".to_string()],
        );
        let yaml = config.to_yaml().unwrap();
        let parsed: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed["context"].as_str(), Some("talos"));
        assert_eq!(parsed["contexts"]["talos"]["endpoints"][0].as_str(), Some("203.0.113.1"));
        assert_eq!(parsed["contexts"]["talos"]["ca"].as_str(), Some(STANDARD.encode("CA").as_str()));
    }

    #[test]
    fn test_debug_redacts_key() {
        let identity = ClientConfiguration::from_pem("CA", "CRT", "very-secret-key");
        let printed = format!("{:?}", identity);
        assert!(!printed.contains(&STANDARD.encode("very-secret-key")));
    }
}
