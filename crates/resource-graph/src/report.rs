//! Evaluation report

use crate::error::GraphError;
use crate::id::ResourceId;
use crate::lifecycle::Action;
use std::collections::BTreeMap;

/// Final status of one resource after an evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Resolved; the action that was (or, in preview, would be) taken
    Done(Action),
    /// Inputs not yet known (preview only): an upstream resource will change first
    Pending,
    /// Provider or input rendering failed; message is surfaced verbatim
    Failed(String),
    /// Not evaluated because an upstream resource failed
    Blocked,
}

/// Outcome of evaluating a graph
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub statuses: BTreeMap<ResourceId, Status>,
    /// Recorded resources that were deleted because they are no longer declared
    pub pruned: Vec<ResourceId>,
    /// Recorded resources no longer declared that have no registered reaper
    pub orphaned: Vec<ResourceId>,
    /// Order in which provider calls completed
    pub completion_order: Vec<ResourceId>,
}

impl Report {
    /// Status of a resource
    pub fn status(&self, id: &ResourceId) -> Option<&Status> {
        self.statuses.get(id)
    }

    /// Every resource resolved
    pub fn is_success(&self) -> bool {
        self.statuses
            .values()
            .all(|status| matches!(status, Status::Done(_) | Status::Pending))
    }

    /// Number of resources that resolved with the given action
    pub fn count(&self, action: Action) -> usize {
        self.statuses
            .values()
            .filter(|status| **status == Status::Done(action))
            .count()
    }

    /// Resources that changed something remotely
    pub fn changes(&self) -> Vec<(&ResourceId, Action)> {
        self.statuses
            .iter()
            .filter_map(|(id, status)| match status {
                Status::Done(action) if action.is_change() => Some((id, *action)),
                _ => None,
            })
            .chain(self.pruned.iter().map(|id| (id, Action::Delete)))
            .collect()
    }

    /// Resources that failed, with their messages
    pub fn failures(&self) -> Vec<(&ResourceId, &str)> {
        self.statuses
            .iter()
            .filter_map(|(id, status)| match status {
                Status::Failed(message) => Some((id, message.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Resources skipped because something upstream failed
    pub fn blocked(&self) -> Vec<&ResourceId> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == Status::Blocked)
            .map(|(id, _)| id)
            .collect()
    }

    /// One line per non-trivial status, for logs
    pub fn summary(&self) -> String {
        let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for status in self.statuses.values() {
            let label = match status {
                Status::Done(Action::Create) => "create",
                Status::Done(Action::Update) => "update",
                Status::Done(Action::Replace) => "replace",
                Status::Done(Action::Read) => "read",
                Status::Done(Action::Same) => "same",
                Status::Done(Action::Delete) => "delete",
                Status::Pending => "pending",
                Status::Failed(_) => "failed",
                Status::Blocked => "blocked",
            };
            *counts.entry(label).or_insert(0) += 1;
        }
        if !self.pruned.is_empty() {
            *counts.entry("delete").or_insert(0) += self.pruned.len();
        }
        counts
            .iter()
            .map(|(label, count)| format!("{}={}", label, count))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Turn the first failure into an error
    pub fn into_result(self) -> Result<Self, GraphError> {
        let first = self
            .failures()
            .first()
            .map(|(id, message)| ((*id).clone(), (*message).to_string()));
        match first {
            Some((resource, message)) => Err(GraphError::Provider {
                resource,
                source: message.into(),
            }),
            None => Ok(self),
        }
    }
}
