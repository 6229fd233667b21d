//! ClusterIssuer CRD
//!
//! cert-manager's cluster-scoped issuer. Only the ACME issuer with HTTP-01
//! solving through an ingress class is modelled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Let's Encrypt production directory
pub const LETSENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "ClusterIssuer",
    status = "ClusterIssuerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIssuerSpec {
    /// ACME issuer configuration
    pub acme: AcmeIssuer,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeIssuer {
    /// ACME directory URL
    pub server: String,

    /// Account contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Secret holding the ACME account key
    pub private_key_secret_ref: SecretKeySelector,

    /// Challenge solvers
    pub solvers: Vec<AcmeSolver>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeSolver {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http01: Option<Http01Solver>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Http01Solver {
    pub ingress: Http01Ingress,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Http01Ingress {
    /// Ingress class that serves the challenge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterIssuerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<IssuerCondition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl ClusterIssuerSpec {
    /// ACME issuer solving HTTP-01 challenges through `ingress_class`
    pub fn acme_http01(server: &str, email: Option<String>, account_secret: &str, ingress_class: &str) -> Self {
        Self {
            acme: AcmeIssuer {
                server: server.to_string(),
                email,
                private_key_secret_ref: SecretKeySelector {
                    name: account_secret.to_string(),
                },
                solvers: vec![AcmeSolver {
                    http01: Some(Http01Solver {
                        ingress: Http01Ingress {
                            class: Some(ingress_class.to_string()),
                        },
                    }),
                }],
            },
        }
    }
}

impl ClusterIssuerStatus {
    /// Whether the issuer reports `Ready=True`
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition_type == "Ready" && c.status == "True")
    }
}
