//! Dependency graph of declared resources.
//!
//! Nodes and reference edges are assembled by the [`GraphBuilder`] into
//! a validated DAG; the planner and executor operate on the result.

mod builder;
mod node;
mod reference;

pub use builder::GraphBuilder;
pub use node::{NodeId, NodeState, ResourceKind, ResourceNode};
pub use reference::{PropertyValue, RawReference, Reference};

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Where a unit export points: a producer node and one of its outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    /// The producing node.
    pub producer: NodeId,
    /// The output key on the producer.
    pub output: String,
}

/// A validated, acyclic graph of resource nodes and reference edges.
///
/// Nodes are stored in declaration order; the executor is the only
/// mutator after construction.
#[derive(Debug)]
pub struct DependencyGraph {
    nodes: Vec<ResourceNode>,
    index: HashMap<NodeId, usize>,
    edges: Vec<Reference>,
    exports: BTreeMap<String, BTreeMap<String, ExportTarget>>,
}

impl DependencyGraph {
    pub(crate) fn new(
        nodes: Vec<ResourceNode>,
        edges: Vec<Reference>,
        exports: BTreeMap<String, BTreeMap<String, ExportTarget>>,
    ) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            nodes,
            index,
            edges,
            exports,
        }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns all nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Returns all reference edges.
    #[must_use]
    pub fn edges(&self) -> &[Reference] {
        &self.edges
    }

    /// Returns per-unit export declarations.
    #[must_use]
    pub const fn exports(&self) -> &BTreeMap<String, BTreeMap<String, ExportTarget>> {
        &self.exports
    }

    /// Gets a node by identifier.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Gets a mutable reference to a node by identifier.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut ResourceNode> {
        self.index.get(id).map(|&i| &mut self.nodes[i])
    }

    /// Returns true if the graph contains a node with the given identifier.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the distinct producers the given node depends on.
    #[must_use]
    pub fn dependencies_of(&self, id: &NodeId) -> BTreeSet<&NodeId> {
        self.edges
            .iter()
            .filter(|e| &e.consumer == id)
            .map(|e| &e.producer)
            .collect()
    }

    /// Returns the distinct direct consumers of the given node.
    #[must_use]
    pub fn dependents_of(&self, id: &NodeId) -> BTreeSet<&NodeId> {
        self.edges
            .iter()
            .filter(|e| &e.producer == id)
            .map(|e| &e.consumer)
            .collect()
    }

    /// Returns every node transitively depending on the given node.
    #[must_use]
    pub fn transitive_dependents(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<NodeId> = self.dependents_of(id).into_iter().cloned().collect();

        while let Some(next) = stack.pop() {
            if result.insert(next.clone()) {
                stack.extend(self.dependents_of(&next).into_iter().cloned());
            }
        }

        result
    }

    /// Collects each Provisioned node's outputs into a single map.
    #[must_use]
    pub fn output_map(&self) -> BTreeMap<NodeId, BTreeMap<String, serde_json::Value>> {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Provisioned)
            .map(|n| (n.id.clone(), n.outputs.clone()))
            .collect()
    }

    /// Resolves the export surface against provisioned outputs.
    ///
    /// Units whose producers did not reach `Provisioned` are omitted
    /// per missing key.
    #[must_use]
    pub fn resolved_exports(&self) -> BTreeMap<String, BTreeMap<String, serde_json::Value>> {
        let mut resolved = BTreeMap::new();
        for (unit, targets) in &self.exports {
            let mut values = BTreeMap::new();
            for (key, target) in targets {
                if let Some(node) = self.node(&target.producer)
                    && node.state == NodeState::Provisioned
                    && let Some(value) = node.outputs.get(&target.output)
                {
                    values.insert(key.clone(), value.clone());
                }
            }
            if !values.is_empty() {
                resolved.insert(unit.clone(), values);
            }
        }
        resolved
    }
}
