//! Stable resource identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a declared resource: `<kind>/<name>`.
///
/// Ids are derived from what a resource *is* (its kind and logical name),
/// never from identifiers handed out by a remote API, so the same
/// declaration maps to the same record on every evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create an id from a kind and a logical name
    pub fn new(kind: &str, name: &str) -> Self {
        Self(format!("{}/{}", kind, name))
    }

    /// The full `<kind>/<name>` string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resource kind (everything before the first `/`)
    pub fn kind(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(kind, _)| kind)
    }

    /// Logical name (everything after the first `/`)
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, name)| name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
