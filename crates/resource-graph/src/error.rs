//! Resource graph errors

use crate::id::ResourceId;
use thiserror::Error;

/// Error returned by a resource provider call.
///
/// Providers wrap whatever their remote API returned; the engine surfaces it
/// unchanged.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while building or evaluating a resource graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// The same resource id was declared twice
    #[error("Duplicate resource: {0}")]
    DuplicateResource(ResourceId),

    /// A resource depends on an id that was never declared
    #[error("Resource {resource} depends on unknown resource {dependency}")]
    UnknownDependency {
        resource: ResourceId,
        dependency: ResourceId,
    },

    /// The declared dependency edges contain a cycle
    #[error("Dependency cycle involving: {}", format_ids(.0))]
    Cycle(Vec<ResourceId>),

    /// A resource read an upstream output that is not available
    #[error("Resource {resource} is missing input {input}")]
    MissingInput {
        resource: ResourceId,
        input: String,
    },

    /// Rendering the desired inputs of a resource failed
    #[error("Invalid inputs for {resource}: {message}")]
    InvalidInputs {
        resource: ResourceId,
        message: String,
    },

    /// The remote API rejected a call
    #[error("Provider error for {resource}: {source}")]
    Provider {
        resource: ResourceId,
        #[source]
        source: ProviderError,
    },

    /// State file could not be read or written
    #[error("State IO error: {0}")]
    Io(#[from] std::io::Error),

    /// State file could not be (de)serialized
    #[error("State serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State store is unusable (e.g. poisoned lock)
    #[error("State error: {0}")]
    State(String),
}

fn format_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ResourceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
