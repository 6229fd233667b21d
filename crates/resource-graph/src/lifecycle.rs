//! Lifecycle policies and action planning
//!
//! Decides, from a resource's recorded inputs and its newly rendered inputs,
//! what the engine must do with it.

use crate::state::ResourceRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What to do when the inputs of an existing resource change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChange {
    /// Call the provider's update in place
    Update,
    /// Delete the existing resource, then create it again
    Replace,
    /// Never touch the resource again once created
    Never,
}

/// Per-resource lifecycle policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    /// Reaction to changed inputs
    pub on_change: OnChange,
    /// Top-level input keys whose changes are not considered at all
    pub ignore_changes: Vec<String>,
    /// Data sources are recomputed on every evaluation and never diffed
    pub data_source: bool,
}

impl Lifecycle {
    /// Changed inputs are pushed with an in-place update
    pub fn update() -> Self {
        Self {
            on_change: OnChange::Update,
            ignore_changes: Vec::new(),
            data_source: false,
        }
    }

    /// Changed inputs replace the resource
    pub fn replace() -> Self {
        Self {
            on_change: OnChange::Replace,
            ..Self::update()
        }
    }

    /// Created at most once; later input changes are ignored
    pub fn create_only() -> Self {
        Self {
            on_change: OnChange::Never,
            ..Self::update()
        }
    }

    /// Pure computation re-run on every evaluation
    pub fn data_source() -> Self {
        Self {
            data_source: true,
            ..Self::update()
        }
    }

    /// Exclude the given top-level input keys from change detection
    #[must_use]
    pub fn ignore_changes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_changes.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Plan the action for a resource given its prior record and desired inputs
    pub fn plan(&self, prior: Option<&ResourceRecord>, desired: &Value) -> Action {
        if self.data_source {
            return Action::Read;
        }
        let Some(prior) = prior else {
            return Action::Create;
        };
        if changed_keys(&prior.inputs, desired, &self.ignore_changes).is_empty() {
            return Action::Same;
        }
        match self.on_change {
            OnChange::Update => Action::Update,
            OnChange::Replace => Action::Replace,
            OnChange::Never => Action::Same,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::update()
    }
}

/// Action taken (or, in preview, to be taken) for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Replace,
    Read,
    Same,
    Delete,
}

impl Action {
    /// Whether the action calls a provider mutation
    pub fn is_change(self) -> bool {
        matches!(self, Action::Create | Action::Update | Action::Replace | Action::Delete)
    }
}

/// Top-level keys whose values differ between `prior` and `desired`,
/// skipping ignored keys. Non-object inputs compare as a whole under `""`.
pub fn changed_keys(prior: &Value, desired: &Value, ignore: &[String]) -> Vec<String> {
    match (prior, desired) {
        (Value::Object(old), Value::Object(new)) => {
            let mut keys: Vec<String> = old
                .keys()
                .chain(new.keys())
                .filter(|key| !ignore.iter().any(|ignored| ignored == *key))
                .filter(|key| old.get(*key) != new.get(*key))
                .cloned()
                .collect();
            keys.sort();
            keys.dedup();
            keys
        }
        _ if prior == desired => Vec::new(),
        _ => vec![String::new()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ResourceId;
    use serde_json::json;

    fn record(inputs: Value) -> ResourceRecord {
        ResourceRecord::new(ResourceId::new("server", "worker-0"), inputs, json!({}))
    }

    #[test]
    fn test_create_without_record() {
        assert_eq!(Lifecycle::update().plan(None, &json!({"a": 1})), Action::Create);
        assert_eq!(Lifecycle::create_only().plan(None, &json!({})), Action::Create);
    }

    #[test]
    fn test_same_inputs_are_same() {
        let prior = record(json!({"location": "fsn1", "image": "1"}));
        let desired = json!({"image": "1", "location": "fsn1"});
        assert_eq!(Lifecycle::replace().plan(Some(&prior), &desired), Action::Same);
    }

    #[test]
    fn test_ignored_key_does_not_replace() {
        let prior = record(json!({"location": "fsn1", "user_data": "old"}));
        let desired = json!({"location": "fsn1", "user_data": "new"});
        let lifecycle = Lifecycle::replace().ignore_changes(["user_data"]);
        assert_eq!(lifecycle.plan(Some(&prior), &desired), Action::Same);
    }

    #[test]
    fn test_other_key_still_replaces() {
        let prior = record(json!({"location": "fsn1", "user_data": "old"}));
        let desired = json!({"location": "nbg1", "user_data": "new"});
        let lifecycle = Lifecycle::replace().ignore_changes(["user_data"]);
        assert_eq!(lifecycle.plan(Some(&prior), &desired), Action::Replace);
    }

    #[test]
    fn test_create_only_never_changes() {
        let prior = record(json!({"node": "10.0.0.1"}));
        let desired = json!({"node": "10.0.0.2"});
        assert_eq!(Lifecycle::create_only().plan(Some(&prior), &desired), Action::Same);
    }

    #[test]
    fn test_data_source_always_reads() {
        let prior = record(json!({"a": 1}));
        assert_eq!(Lifecycle::data_source().plan(Some(&prior), &json!({"a": 1})), Action::Read);
        assert_eq!(Lifecycle::data_source().plan(None, &json!({"a": 1})), Action::Read);
    }

    #[test]
    fn test_changed_keys_reports_added_and_removed() {
        let keys = changed_keys(&json!({"a": 1, "b": 2}), &json!({"b": 2, "c": 3}), &[]);
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
    }
}
