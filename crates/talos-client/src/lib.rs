//! Talos management-plane client
//!
//! Pushes machine configuration to nodes, bootstraps the first control-plane
//! node and retrieves the admin kubeconfig. The concrete client drives the
//! `talosctl` binary with a generated talosconfig.
//!
//! # Example
//!
//! ```no_run
//! use talos_client::{ClientConfiguration, MachineApiTrait, TalosctlClient};
//!
//! # async fn example(identity: ClientConfiguration, config: String) -> Result<(), talos_client::TalosError> {
//! let talos = TalosctlClient::new("talosctl");
//! talos.apply_configuration(&identity, "203.0.113.10", &config).await?;
//! talos.bootstrap(&identity, "203.0.113.10").await?;
//! let kubeconfig = talos.kubeconfig(&identity, "203.0.113.1", "203.0.113.10").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod talosctl;
#[path = "trait.rs"]
pub mod talos_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use error::TalosError;
pub use models::{ClientConfiguration, TalosConfig};
pub use talos_trait::MachineApiTrait;
pub use talosctl::TalosctlClient;
#[cfg(feature = "test-util")]
pub use mock::{MachineCall, MockMachineApi};
