//! `GraphFlow`: composes tasks/subflows into a DAG whose edges are derived
//! from each item's declared `requires`/`provides` symbols.
//!
//! `add` builds two auxiliary maps (`requirements`, `provided`) from the
//! graph's current contents before linking anything, and rolls back the
//! whole call on failure rather than leaving a partially-linked graph
//! behind.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::algo::is_cyclic_directed;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::IntoNodeReferences;

use crate::errors::{FlowError, FlowResult};

/// The shape a task or subflow must expose to be composed by `GraphFlow`.
///
/// Mirrors the task interface an engine consumes: only `name`, `requires` and
/// `provides` are read, and only at `add` time.
pub trait FlowItem: Clone {
    fn name(&self) -> &str;
    fn requires(&self) -> &HashSet<String>;
    fn provides(&self) -> &HashSet<String>;
}

/// A dependency graph over `FlowItem`s, built incrementally by `add`.
///
/// Nodes are keyed by `FlowItem::name()` rather than by identity: a task's
/// name is the one stable handle the task interface actually exposes.
/// `StableDiGraph` is used so the rollback in `add` (node removal) never
/// perturbs `NodeIndex`es a caller might be holding via `graph()`.
#[derive(Debug, Clone)]
pub struct GraphFlow<T: FlowItem> {
    graph: StableDiGraph<T, ()>,
    index_by_name: IndexMap<String, NodeIndex>,
}

impl<T: FlowItem> Default for GraphFlow<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FlowItem> GraphFlow<T> {
    pub fn new() -> Self {
        Self { graph: StableDiGraph::new(), index_by_name: IndexMap::new() }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Union of `provides` over every node currently in the flow.
    pub fn provides(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for (_, item) in self.graph.node_references() {
            out.extend(item.provides().iter().cloned());
        }
        out
    }

    /// Union of `requires` over every node, minus what the flow itself
    /// provides internally.
    pub fn requires(&self) -> HashSet<String> {
        let mut out = HashSet::new();
        for (_, item) in self.graph.node_references() {
            out.extend(item.requires().iter().cloned());
        }
        let provided = self.provides();
        out.retain(|s| !provided.contains(s));
        out
    }

    /// Read-only access to the underlying DAG, for the engine to compute a
    /// topological execution order.
    pub fn graph(&self) -> &StableDiGraph<T, ()> {
        &self.graph
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index_by_name.get(name).copied()
    }

    /// Iterates nodes in graph/node-set order (insertion order of the
    /// underlying index map, not a topological order).
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.index_by_name.values().map(move |idx| &self.graph[*idx])
    }

    /// Explicit edge insertion between two already-present items, by name.
    ///
    /// Fails with `Argument` if either endpoint is absent: a missing item is
    /// a caller mistake, not a state the graph itself failed to find. If the
    /// new edge would close a cycle, it is removed again and a `Dependency`
    /// error is raised.
    pub fn link(&mut self, u: &str, v: &str) -> FlowResult<()> {
        let u_idx = self.node_index(u).ok_or_else(|| FlowError::Argument(format!("item {u} not found to link from")))?;
        let v_idx = self.node_index(v).ok_or_else(|| FlowError::Argument(format!("item {v} not found to link to")))?;
        self.link_indices(u_idx, v_idx)
    }

    fn link_indices(&mut self, u_idx: NodeIndex, v_idx: NodeIndex) -> FlowResult<()> {
        let edge = self.graph.add_edge(u_idx, v_idx, ());
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            tracing::debug!(?u_idx, ?v_idx, "link rejected, would close a cycle");
            return Err(FlowError::Dependency(
                "no path through the items in the graph produces an ordering that will allow for correct dependency resolution".to_string(),
            ));
        }
        tracing::trace!(?u_idx, ?v_idx, "linked");
        Ok(())
    }

    /// Inserts `items` and derives edges from their declared symbols.
    ///
    /// On any failure (duplicate producer, cycle) the whole call rolls
    /// back: every node this call inserted is removed and the graph is
    /// left exactly as it was before `add` was invoked. The order items
    /// are given in does not affect the resulting edge set.
    pub fn add(&mut self, items: impl IntoIterator<Item = T>) -> FlowResult<()> {
        let items: Vec<T> = items.into_iter().collect();
        if items.is_empty() {
            return Ok(());
        }

        let mut requirements: HashMap<String, Vec<NodeIndex>> = HashMap::new();
        let mut provided: HashMap<String, NodeIndex> = HashMap::new();
        for (idx, item) in self.graph.node_references() {
            for value in item.requires() {
                requirements.entry(value.clone()).or_default().push(idx);
            }
            for value in item.provides() {
                provided.insert(value.clone(), idx);
            }
        }

        let mut inserted: Vec<NodeIndex> = Vec::with_capacity(items.len());

        let result = (|| -> FlowResult<()> {
            for item in items {
                if self.index_by_name.contains_key(item.name()) {
                    return Err(FlowError::Duplicate(format!("item with name {} already in graph", item.name())));
                }

                let name = item.name().to_string();
                let node_idx = self.graph.add_node(item.clone());
                inserted.push(node_idx);
                self.index_by_name.insert(name, node_idx);

                for value in item.requires() {
                    requirements.entry(value.clone()).or_default().push(node_idx);
                }

                for value in item.provides() {
                    if let Some(existing) = provided.get(value) {
                        let existing_name = self.graph[*existing].name().to_string();
                        return Err(FlowError::Dependency(format!(
                            "{} provides {} but is already being provided by {} and duplicate producers are disallowed",
                            item.name(),
                            value,
                            existing_name
                        )));
                    }
                    provided.insert(value.clone(), node_idx);
                }

                for value in item.requires() {
                    if let Some(&producer_idx) = provided.get(value) {
                        // No guard against producer_idx == node_idx: an item
                        // that both requires and provides the same symbol is
                        // its own producer, and link_indices must be left to
                        // reject the resulting self-loop as a cycle.
                        self.link_indices(producer_idx, node_idx)?;
                    }
                }

                for value in item.provides() {
                    if let Some(consumers) = requirements.get(value) {
                        for &consumer_idx in consumers {
                            self.link_indices(node_idx, consumer_idx)?;
                        }
                    }
                }
            }
            Ok(())
        })();

        if let Err(err) = result {
            tracing::debug!(error = %err, inserted = inserted.len(), "add() rolled back");
            for idx in inserted {
                if let Some(item) = self.graph.remove_node(idx) {
                    self.index_by_name.swap_remove(item.name());
                }
            }
            return Err(err);
        }

        Ok(())
    }
}
