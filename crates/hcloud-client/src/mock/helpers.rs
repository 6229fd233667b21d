//! Helper functions for creating nested Hetzner Cloud model types

use crate::models::*;

/// Helper functions for creating nested types in mock implementations
pub struct Helpers {
    id: u64,
}

impl Helpers {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    /// Deterministic public address derived from the object id
    pub fn ipv4(&self) -> String {
        format!("203.0.113.{}", self.id % 250 + 1)
    }

    /// Helper to create a Datacenter in `location`
    pub fn datacenter(&self, location: &str) -> Datacenter {
        Datacenter {
            name: format!("{}-dc14", location),
            location: NamedRef {
                id: None,
                name: location.to_string(),
            },
        }
    }

    /// Helper to create a NamedRef
    pub fn named(&self, name: &str) -> NamedRef {
        NamedRef {
            id: None,
            name: name.to_string(),
        }
    }

    /// Helper to create an already finished Action
    pub fn finished_action(&self, command: &str) -> Action {
        Action {
            id: self.id,
            command: command.to_string(),
            status: ActionStatus::Success,
            progress: 100,
            error: None,
        }
    }

    /// Helper to create an Action that is still running
    pub fn running_action(&self, command: &str) -> Action {
        Action {
            id: self.id,
            command: command.to_string(),
            status: ActionStatus::Running,
            progress: 0,
            error: None,
        }
    }
}
