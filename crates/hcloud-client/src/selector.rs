//! Label selectors
//!
//! The binding primitive behind label-selector load-balancer targets:
//! "targets = every server currently carrying these labels". Selectors are
//! kept as values and evaluated against current labels, never flattened
//! into a list of servers.

use crate::error::HcloudError;
use crate::models::Labels;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    NotExists(String),
}

/// Parsed label selector (`type=worker`, `env!=prod`, `managed`, `!legacy`),
/// comma-separated requirements are ANDed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    raw: String,
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector expression
    pub fn parse(raw: &str) -> Result<Self, HcloudError> {
        let mut requirements = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let requirement = if let Some((key, value)) = part.split_once("!=") {
                Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = part.split_once("==").or_else(|| part.split_once('=')) {
                Requirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else if let Some(key) = part.strip_prefix('!') {
                Requirement::NotExists(key.trim().to_string())
            } else {
                Requirement::Exists(part.to_string())
            };
            let key = match &requirement {
                Requirement::Equals(k, _)
                | Requirement::NotEquals(k, _)
                | Requirement::Exists(k)
                | Requirement::NotExists(k) => k,
            };
            if key.is_empty() {
                return Err(HcloudError::InvalidRequest(format!(
                    "label selector {:?} has an empty key",
                    raw
                )));
            }
            requirements.push(requirement);
        }
        if requirements.is_empty() {
            return Err(HcloudError::InvalidRequest("empty label selector".to_string()));
        }
        Ok(Self {
            raw: raw.trim().to_string(),
            requirements,
        })
    }

    /// Selector for a single `key=value` pair
    pub fn equals(key: &str, value: &str) -> Self {
        Self {
            raw: format!("{}={}", key, value),
            requirements: vec![Requirement::Equals(key.to_string(), value.to_string())],
        }
    }

    /// The selector expression as sent to the API
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `labels` satisfy every requirement
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|requirement| match requirement {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::NotExists(k) => !labels.contains_key(k),
        })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
