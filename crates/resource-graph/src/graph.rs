//! Graph construction and validation

use crate::error::GraphError;
use crate::id::ResourceId;
use crate::resource::{Reaper, Resource};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

pub(crate) struct Node {
    pub(crate) resource: Arc<dyn Resource>,
    pub(crate) depends_on: Vec<ResourceId>,
}

/// A validated, acyclic resource graph
pub struct Graph {
    pub(crate) nodes: BTreeMap<ResourceId, Node>,
    pub(crate) dependents: BTreeMap<ResourceId, Vec<ResourceId>>,
    pub(crate) order: Vec<ResourceId>,
    pub(crate) reapers: HashMap<String, Arc<dyn Reaper>>,
}

impl Graph {
    /// Start declaring a graph
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether a resource is declared
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Declared dependencies of a resource
    pub fn dependencies(&self, id: &ResourceId) -> &[ResourceId] {
        self.nodes.get(id).map_or(&[], |node| node.depends_on.as_slice())
    }

    /// One valid topological order (dependencies first)
    pub fn topological_order(&self) -> &[ResourceId] {
        &self.order
    }

    /// Every resource that transitively depends on `id`
    pub fn transitive_dependents(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&ResourceId> = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents.get(current).into_iter().flatten() {
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }
        seen
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("order", &self.order)
            .field("reapers", &self.reapers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects declarations; [`GraphBuilder::build`] validates them
#[derive(Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<ResourceId, Node>,
    reapers: HashMap<String, Arc<dyn Reaper>>,
}

impl GraphBuilder {
    /// Declare a resource and the resources whose outputs it needs
    pub fn add(
        &mut self,
        id: ResourceId,
        resource: impl Resource + 'static,
        depends_on: &[ResourceId],
    ) -> Result<&mut Self, GraphError> {
        self.add_shared(id, Arc::new(resource), depends_on)
    }

    /// Declare a resource that is already shared
    pub fn add_shared(
        &mut self,
        id: ResourceId,
        resource: Arc<dyn Resource>,
        depends_on: &[ResourceId],
    ) -> Result<&mut Self, GraphError> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateResource(id));
        }
        let mut deps = depends_on.to_vec();
        deps.sort();
        deps.dedup();
        self.nodes.insert(
            id,
            Node {
                resource,
                depends_on: deps,
            },
        );
        Ok(self)
    }

    /// Register how to delete recorded resources of `kind` that are no longer declared
    pub fn reaper(&mut self, kind: &str, reaper: impl Reaper + 'static) -> &mut Self {
        self.reapers.insert(kind.to_string(), Arc::new(reaper));
        self
    }

    /// Validate edges and compute a topological order
    pub fn build(self) -> Result<Graph, GraphError> {
        let mut dependents: BTreeMap<ResourceId, Vec<ResourceId>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&ResourceId, usize> = BTreeMap::new();

        for (id, node) in &self.nodes {
            in_degree.entry(id).or_insert(0);
            for dep in &node.depends_on {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        resource: id.clone(),
                        dependency: dep.clone(),
                    });
                }
                if dep == id {
                    return Err(GraphError::Cycle(vec![id.clone()]));
                }
                dependents.entry(dep.clone()).or_default().push(id.clone());
                *in_degree.entry(id).or_insert(0) += 1;
            }
        }

        // Kahn's algorithm
        let mut ready: VecDeque<&ResourceId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let cyclic = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.clone())
                .collect();
            return Err(GraphError::Cycle(cyclic));
        }

        Ok(Graph {
            nodes: self.nodes,
            dependents,
            order,
            reapers: self.reapers,
        })
    }
}
