//! Resource Graph
//!
//! A small declarative provisioning engine: resources are declared with
//! explicit dependency edges, evaluated concurrently in data-flow order, and
//! recorded in a persisted state so that re-evaluating the same graph
//! converges instead of creating duplicates.
//!
//! # Example
//!
//! ```no_run
//! use resource_graph::{Engine, Graph, MemoryStateStore, ResourceId};
//! # use resource_graph::{Resource, Resolved, GraphError, ProviderError};
//! # struct Noop;
//! # #[async_trait::async_trait]
//! # impl Resource for Noop {
//! #     fn inputs(&self, _: &Resolved<'_>) -> Result<serde_json::Value, GraphError> { Ok(serde_json::json!({})) }
//! #     async fn create(&self, _: &serde_json::Value) -> Result<serde_json::Value, ProviderError> { Ok(serde_json::json!({})) }
//! # }
//!
//! # async fn example() -> Result<(), GraphError> {
//! let lb = ResourceId::new("load-balancer", "control-plane");
//! let server = ResourceId::new("server", "control-plane-0");
//!
//! let mut builder = Graph::builder();
//! builder.add(lb.clone(), Noop, &[])?;
//! builder.add(server, Noop, &[lb])?;
//! let graph = builder.build()?;
//!
//! let report = Engine::new(MemoryStateStore::default()).evaluate(&graph).await?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Dependency edges**: unknown dependencies and cycles are rejected when the graph is built
//! - **Lifecycle policies**: update in place, replace, create-only, ignored input keys, data sources
//! - **Convergence**: unchanged inputs produce no provider calls on re-evaluation
//! - **Preview**: compute the action of every resource without calling providers
//! - **Orphan pruning**: recorded resources no longer declared are deleted through registered reapers
//! - **Published outputs**: named values handed to downstream processes through a file

pub mod engine;
pub mod error;
pub mod graph;
pub mod id;
pub mod lifecycle;
pub mod outputs;
pub mod report;
pub mod resource;
pub mod state;

pub use engine::{Engine, Mode};
pub use error::{GraphError, ProviderError};
pub use graph::{Graph, GraphBuilder};
pub use id::ResourceId;
pub use lifecycle::{Action, Lifecycle, OnChange};
pub use outputs::Outputs;
pub use report::{Report, Status};
pub use resource::{Reaper, Resolved, Resource};
pub use state::{FileStateStore, GraphState, MemoryStateStore, ResourceRecord, StateStore};
