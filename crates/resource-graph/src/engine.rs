//! Graph evaluation
//!
//! Resources are started as soon as every declared dependency has resolved,
//! so independent branches (e.g. all servers of all roles) run concurrently
//! while dependents wait. A failed resource halts only its own branch.
//!
//! In [`Mode::Apply`] the state is saved after every completed resource, so
//! an aborted evaluation can be resumed by evaluating the same graph again.

use crate::error::{GraphError, ProviderError};
use crate::graph::Graph;
use crate::id::ResourceId;
use crate::lifecycle::Action;
use crate::report::{Report, Status};
use crate::resource::{Resolved, Resource};
use crate::state::{GraphState, ResourceRecord, StateStore};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Evaluation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Call providers and persist state
    Apply,
    /// Compute actions only; providers are not called (data sources excepted)
    Preview,
}

/// Result of one provider call, carried back to the evaluation loop
struct Executed {
    id: ResourceId,
    action: Action,
    inputs: Value,
    prior: Option<ResourceRecord>,
    result: Result<Value, ProviderError>,
}

/// What happened when a ready resource was started
enum Started {
    /// A provider call is in flight
    Running(BoxFuture<'static, Executed>),
    /// Resolved without a provider call; `None` outputs are unknown (preview)
    Resolved(Status, Option<Value>),
    /// Inputs could not be rendered
    Failed(String),
}

/// Evaluates graphs against a state store
#[derive(Debug)]
pub struct Engine<S: StateStore> {
    store: S,
    mode: Mode,
}

impl<S: StateStore> Engine<S> {
    /// Engine that applies changes
    pub fn new(store: S) -> Self {
        Self {
            store,
            mode: Mode::Apply,
        }
    }

    /// Engine that only previews changes
    pub fn preview(store: S) -> Self {
        Self {
            store,
            mode: Mode::Preview,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Evaluate every resource of `graph` in dependency order.
    ///
    /// Provider failures are reported per resource in the returned [`Report`];
    /// only state store failures abort the evaluation with an error.
    pub async fn evaluate(&self, graph: &Graph) -> Result<Report, GraphError> {
        let mut state = self.store.load()?;
        let mut report = Report::default();
        let mut outputs: BTreeMap<ResourceId, Value> = BTreeMap::new();
        let mut unknown: BTreeSet<ResourceId> = BTreeSet::new();

        let mut remaining: BTreeMap<&ResourceId, usize> = graph
            .nodes
            .iter()
            .map(|(id, node)| (id, node.depends_on.len()))
            .collect();
        let mut ready: Vec<&ResourceId> = graph
            .order
            .iter()
            .filter(|id| remaining.get(id).copied() == Some(0))
            .collect();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Executed>> = FuturesUnordered::new();

        info!("Evaluating {} resources ({:?})", graph.len(), self.mode);

        loop {
            while let Some(id) = ready.pop() {
                match self.start(graph, id, &state, &outputs, &unknown) {
                    Started::Running(future) => in_flight.push(future),
                    Started::Resolved(status, value) => {
                        if self.mode == Mode::Apply && matches!(status, Status::Done(Action::Same)) {
                            self.refresh_dependencies(graph, id, &mut state)?;
                        }
                        match value {
                            Some(value) => {
                                outputs.insert(id.clone(), value);
                            }
                            None => {
                                unknown.insert(id.clone());
                            }
                        }
                        report.statuses.insert(id.clone(), status);
                        release(graph, id, &mut remaining, &mut ready);
                    }
                    Started::Failed(message) => {
                        error!("Failed to render inputs for {}: {}", id, message);
                        report.statuses.insert(id.clone(), Status::Failed(message));
                    }
                }
            }

            let Some(executed) = in_flight.next().await else {
                break;
            };
            let Executed {
                id,
                action,
                inputs,
                prior,
                result,
            } = executed;

            match result {
                Ok(value) => {
                    if self.mode == Mode::Apply && action != Action::Read {
                        let record = match (action, prior) {
                            (Action::Update, Some(prior)) => prior.updated(inputs, value.clone()),
                            _ => ResourceRecord::new(id.clone(), inputs, value.clone()),
                        }
                        .with_dependencies(graph.dependencies(&id).to_vec());
                        state.upsert(record);
                        self.store.save(&state)?;
                        info!("{:?} {}", action, id);
                    } else {
                        debug!("{:?} {}", action, id);
                    }
                    outputs.insert(id.clone(), value);
                    report.statuses.insert(id.clone(), Status::Done(action));
                    report.completion_order.push(id.clone());
                    if let Some((key, _)) = graph.nodes.get_key_value(&id) {
                        release(graph, key, &mut remaining, &mut ready);
                    }
                }
                Err(e) => {
                    error!("{:?} {} failed: {}", action, id, e);
                    report.statuses.insert(id, Status::Failed(e.to_string()));
                }
            }
        }

        for id in graph.nodes.keys() {
            if !report.statuses.contains_key(id) {
                warn!("{} blocked by an upstream failure", id);
                report.statuses.insert(id.clone(), Status::Blocked);
            }
        }

        if report.is_success() {
            self.prune(graph, &mut state, &mut report).await?;
        }

        info!("Evaluation finished: {}", report.summary());
        Ok(report)
    }

    fn start(
        &self,
        graph: &Graph,
        id: &ResourceId,
        state: &GraphState,
        outputs: &BTreeMap<ResourceId, Value>,
        unknown: &BTreeSet<ResourceId>,
    ) -> Started {
        let Some(node) = graph.nodes.get(id) else {
            return Started::Failed(format!("{} is not declared", id));
        };

        if node.depends_on.iter().any(|dep| unknown.contains(dep)) {
            debug!("{} waits on unknown upstream outputs", id);
            return Started::Resolved(Status::Pending, None);
        }

        let upstream = Resolved::new(
            id,
            node.depends_on
                .iter()
                .filter_map(|dep| outputs.get(dep).map(|value| (dep, value)))
                .collect(),
        );
        let inputs = match node.resource.inputs(&upstream) {
            Ok(inputs) => inputs,
            Err(e) => return Started::Failed(e.to_string()),
        };

        let prior = state.get(id).cloned();
        let action = node.resource.lifecycle().plan(prior.as_ref(), &inputs);

        match (self.mode, action) {
            (_, Action::Same) => {
                let value = prior.map(|record| record.outputs);
                Started::Resolved(Status::Done(Action::Same), value)
            }
            (Mode::Preview, Action::Create | Action::Update | Action::Replace | Action::Delete) => {
                Started::Resolved(Status::Done(action), None)
            }
            _ => Started::Running(execute(
                Arc::clone(&node.resource),
                id.clone(),
                action,
                prior,
                inputs,
            )),
        }
    }

    /// Keep the recorded edges of an unchanged resource in step with its declaration
    fn refresh_dependencies(
        &self,
        graph: &Graph,
        id: &ResourceId,
        state: &mut GraphState,
    ) -> Result<(), GraphError> {
        let declared = graph.dependencies(id);
        let Some(record) = state.resources.get_mut(id) else {
            return Ok(());
        };
        if record.depends_on != declared {
            record.depends_on = declared.to_vec();
            self.store.save(state)?;
        }
        Ok(())
    }

    /// Delete recorded resources that are no longer declared.
    ///
    /// Orphans go dependents-first along their recorded edges. A record
    /// something still depends on is kept while that dependent could not be
    /// deleted.
    async fn prune(
        &self,
        graph: &Graph,
        state: &mut GraphState,
        report: &mut Report,
    ) -> Result<(), GraphError> {
        let orphans: Vec<ResourceRecord> = state
            .resources
            .values()
            .filter(|record| !graph.contains(&record.id))
            .cloned()
            .collect();
        let mut held: BTreeSet<ResourceId> = BTreeSet::new();

        for record in dependents_first(orphans) {
            if held.contains(&record.id) {
                warn!("Keeping {}: a resource depending on it could not be deleted", record.id);
                held.extend(record.depends_on.iter().cloned());
                report.statuses.insert(record.id, Status::Blocked);
                continue;
            }

            let Some(reaper) = graph.reapers.get(&record.kind) else {
                warn!("Forgetting {}: no longer declared and nothing deletes it", record.id);
                if self.mode == Mode::Apply {
                    state.remove(&record.id);
                    self.store.save(state)?;
                }
                report.orphaned.push(record.id);
                continue;
            };

            if self.mode == Mode::Preview {
                report.pruned.push(record.id);
                continue;
            }

            match reaper.delete(&record).await {
                Ok(()) => {
                    info!("Delete {}", record.id);
                    state.remove(&record.id);
                    self.store.save(state)?;
                    report.pruned.push(record.id);
                }
                Err(e) => {
                    error!("Delete {} failed: {}", record.id, e);
                    held.extend(record.depends_on.iter().cloned());
                    report.statuses.insert(record.id, Status::Failed(e.to_string()));
                }
            }
        }
        Ok(())
    }
}

/// Order orphaned records so each comes after every orphan recorded as
/// depending on it. Ties and cycles fall back to id order.
fn dependents_first(orphans: Vec<ResourceRecord>) -> Vec<ResourceRecord> {
    let mut dependents: BTreeMap<ResourceId, usize> =
        orphans.iter().map(|record| (record.id.clone(), 0)).collect();
    for record in &orphans {
        for dep in &record.depends_on {
            if let Some(count) = dependents.get_mut(dep) {
                *count += 1;
            }
        }
    }

    let mut pending: BTreeMap<ResourceId, ResourceRecord> =
        orphans.into_iter().map(|record| (record.id.clone(), record)).collect();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let free: Vec<ResourceId> = pending
            .keys()
            .filter(|id| dependents.get(*id).copied() == Some(0))
            .cloned()
            .collect();
        if free.is_empty() {
            warn!("Recorded dependencies of undeclared resources form a cycle");
            ordered.extend(std::mem::take(&mut pending).into_values());
            break;
        }
        for id in free {
            if let Some(record) = pending.remove(&id) {
                for dep in &record.depends_on {
                    if let Some(count) = dependents.get_mut(dep) {
                        *count -= 1;
                    }
                }
                ordered.push(record);
            }
        }
    }
    ordered
}

fn release<'g>(
    graph: &'g Graph,
    id: &ResourceId,
    remaining: &mut BTreeMap<&'g ResourceId, usize>,
    ready: &mut Vec<&'g ResourceId>,
) {
    for dependent in graph.dependents.get(id).into_iter().flatten() {
        if let Some(count) = remaining.get_mut(dependent) {
            *count -= 1;
            if *count == 0 {
                ready.push(dependent);
            }
        }
    }
}

fn execute(
    resource: Arc<dyn Resource>,
    id: ResourceId,
    action: Action,
    prior: Option<ResourceRecord>,
    inputs: Value,
) -> BoxFuture<'static, Executed> {
    async move {
        debug!("{:?} {} starting", action, id);
        let result = match (action, prior.as_ref()) {
            (Action::Update, Some(prior)) => resource.update(prior, &inputs).await,
            (Action::Replace, Some(prior)) => match resource.delete(prior).await {
                Ok(()) => resource.create(&inputs).await,
                Err(e) => Err(e),
            },
            _ => resource.create(&inputs).await,
        };
        Executed {
            id,
            action,
            inputs,
            prior,
            result,
        }
    }
    .boxed()
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
