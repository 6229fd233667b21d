//! Custom resource types declared by the add-on layer
//!
//! Typed definitions of third-party CRDs the cluster add-ons install
//! and the add-on layer creates instances of.

pub mod cluster_issuer;

pub use cluster_issuer::*;
