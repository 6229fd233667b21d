//! Persisted graph state
//!
//! The state maps every resource id to the inputs it was last applied with
//! and the outputs the provider returned. It is what makes re-evaluation
//! convergent: a resource with a record and unchanged inputs is left alone.

use crate::error::GraphError;
use crate::id::ResourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Current on-disk state format
pub const STATE_VERSION: u32 = 1;

/// Record of one applied resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub id: ResourceId,
    pub kind: String,
    pub inputs: Value,
    pub outputs: Value,
    /// Declared dependencies when last applied; orders deletion once undeclared
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<ResourceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceRecord {
    /// Create a fresh record stamped with the current time
    pub fn new(id: ResourceId, inputs: Value, outputs: Value) -> Self {
        let now = Utc::now();
        Self {
            kind: id.kind().to_string(),
            id,
            inputs,
            outputs,
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Same record with its dependencies set
    pub fn with_dependencies(mut self, depends_on: Vec<ResourceId>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Same resource with new inputs/outputs, keeping its creation time
    pub fn updated(&self, inputs: Value, outputs: Value) -> Self {
        Self {
            id: self.id.clone(),
            kind: self.kind.clone(),
            inputs,
            outputs,
            depends_on: self.depends_on.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// All records of one graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, ResourceRecord>,
}

impl GraphState {
    /// Look up a record
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// Insert or overwrite a record
    pub fn upsert(&mut self, record: ResourceRecord) {
        self.resources.insert(record.id.clone(), record);
    }

    /// Remove a record
    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceRecord> {
        self.resources.remove(id)
    }

    /// Number of records of the given kind
    pub fn count_kind(&self, kind: &str) -> usize {
        self.resources.values().filter(|r| r.kind == kind).count()
    }
}

/// Storage backend for graph state
pub trait StateStore: Send + Sync {
    /// Load the state; a store that was never written yields an empty state
    fn load(&self) -> Result<GraphState, GraphError>;

    /// Persist the state
    fn save(&self, state: &GraphState) -> Result<(), GraphError>;
}

/// JSON state file on local disk
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<GraphState, GraphError> {
        if !self.path.exists() {
            debug!("State file {} does not exist, starting empty", self.path.display());
            return Ok(GraphState {
                version: STATE_VERSION,
                ..Default::default()
            });
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let state: GraphState = serde_json::from_str(&raw)?;
        if state.version > STATE_VERSION {
            return Err(GraphError::State(format!(
                "state file {} has version {}, newest supported is {}",
                self.path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(state)
    }

    fn save(&self, state: &GraphState) -> Result<(), GraphError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut state = state.clone();
        state.version = STATE_VERSION;
        let body = serde_json::to_string_pretty(&state)?;

        // Records carry key material; write privately and swap in atomically
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory state, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<GraphState>>,
}

impl MemoryStateStore {
    /// Start from an existing state
    pub fn with_state(state: GraphState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Result<GraphState, GraphError> {
        self.load()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<GraphState, GraphError> {
        self.inner
            .lock()
            .map(|state| state.clone())
            .map_err(|e| GraphError::State(format!("state lock poisoned: {}", e)))
    }

    fn save(&self, state: &GraphState) -> Result<(), GraphError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| GraphError::State(format!("state lock poisoned: {}", e)))?;
        *guard = state.clone();
        Ok(())
    }
}
