//! Published outputs
//!
//! Named string values one evaluation publishes for another process to read
//! by reference (e.g. admin credentials consumed by a downstream layer).

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Named outputs of an evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(flatten)]
    values: BTreeMap<String, String>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an output, replacing any previous value
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Output that must have been published
    pub fn require(&self, name: &str) -> Result<&str, GraphError> {
        self.get(name)
            .ok_or_else(|| GraphError::State(format!("output {} has not been published", name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Merge `other` into these outputs, `other` wins on conflicts
    pub fn merge(&mut self, other: Outputs) {
        self.values.extend(other.values);
    }

    /// Read outputs from a JSON file
    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GraphError::State(format!("cannot read outputs {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Read outputs, treating a missing file as empty
    pub fn load_or_default(path: &Path) -> Result<Self, GraphError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write outputs as JSON, readable by the owner only
    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
