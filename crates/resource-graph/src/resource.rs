//! Resource trait and upstream output resolution

use crate::error::{GraphError, ProviderError};
use crate::id::ResourceId;
use crate::lifecycle::Lifecycle;
use crate::state::ResourceRecord;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

/// A declared resource.
///
/// `inputs` renders the desired input document from the outputs of the
/// resource's declared dependencies; the engine only calls it once all of
/// them have resolved. Provider methods receive those inputs and return the
/// outputs that dependents will see.
///
/// All methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Lifecycle policy; defaults to in-place update on change
    fn lifecycle(&self) -> Lifecycle {
        Lifecycle::update()
    }

    /// Render the desired inputs from upstream outputs
    fn inputs(&self, upstream: &Resolved<'_>) -> Result<Value, GraphError>;

    /// Create the resource
    async fn create(&self, inputs: &Value) -> Result<Value, ProviderError>;

    /// Update an existing resource in place
    async fn update(&self, prior: &ResourceRecord, inputs: &Value) -> Result<Value, ProviderError> {
        let _ = prior;
        self.create(inputs).await
    }

    /// Delete an existing resource (used by replacement)
    async fn delete(&self, prior: &ResourceRecord) -> Result<(), ProviderError> {
        let _ = prior;
        Ok(())
    }
}

/// Deletes recorded resources of one kind that are no longer declared
#[async_trait::async_trait]
pub trait Reaper: Send + Sync {
    async fn delete(&self, record: &ResourceRecord) -> Result<(), ProviderError>;
}

/// Read-only view of the outputs of a resource's resolved dependencies
#[derive(Debug)]
pub struct Resolved<'a> {
    resource: &'a ResourceId,
    outputs: BTreeMap<&'a ResourceId, &'a Value>,
}

impl<'a> Resolved<'a> {
    /// Build a view for `resource` over the given dependency outputs
    pub fn new(resource: &'a ResourceId, outputs: BTreeMap<&'a ResourceId, &'a Value>) -> Self {
        Self { resource, outputs }
    }

    /// The resource this view was built for
    pub fn resource(&self) -> &ResourceId {
        self.resource
    }

    /// Raw outputs of a dependency
    pub fn output(&self, id: &ResourceId) -> Result<&'a Value, GraphError> {
        self.outputs
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::MissingInput {
                resource: self.resource.clone(),
                input: id.to_string(),
            })
    }

    /// Value at a JSON pointer inside a dependency's outputs
    pub fn pointer(&self, id: &ResourceId, pointer: &str) -> Result<&'a Value, GraphError> {
        self.output(id)?
            .pointer(pointer)
            .ok_or_else(|| GraphError::MissingInput {
                resource: self.resource.clone(),
                input: format!("{}{}", id, pointer),
            })
    }

    /// String at a JSON pointer inside a dependency's outputs
    pub fn string(&self, id: &ResourceId, pointer: &str) -> Result<String, GraphError> {
        let value = self.pointer(id, pointer)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GraphError::InvalidInputs {
                resource: self.resource.clone(),
                message: format!("{}{} is not a string: {}", id, pointer, value),
            })
    }

    /// Deserialize a dependency's outputs
    pub fn typed<T: DeserializeOwned>(&self, id: &ResourceId) -> Result<T, GraphError> {
        serde_json::from_value(self.output(id)?.clone()).map_err(|e| GraphError::InvalidInputs {
            resource: self.resource.clone(),
            message: format!("cannot decode outputs of {}: {}", id, e),
        })
    }
}
