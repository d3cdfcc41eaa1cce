//! Provisioning plan construction.
//!
//! A plan is an ordered sequence of layers. Each layer holds nodes with
//! no edges between them, so everything in a layer may be provisioned in
//! parallel once every earlier layer has completed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::graph::{DependencyGraph, NodeId};

use super::fingerprint::GraphHasher;

/// An ordered, dependency-safe provisioning plan.
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the graph this plan was computed from.
    pub graph_fingerprint: String,
    /// Layers in execution order. Within a layer, nodes appear in
    /// declaration order.
    pub layers: Vec<Vec<NodeId>>,
}

impl ProvisioningPlan {
    /// Computes a plan from a validated graph using Kahn's algorithm.
    ///
    /// Each round collects every node whose unresolved in-degree is
    /// zero into one layer, ordered by declaration index so repeated
    /// runs over an unchanged graph produce an identical plan.
    #[must_use]
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let fingerprint = GraphHasher::new().hash_graph(graph);

        let mut indegree: HashMap<&NodeId, usize> = graph
            .nodes()
            .iter()
            .map(|n| (&n.id, graph.dependencies_of(&n.id).len()))
            .collect();

        let mut layers = Vec::new();
        let mut remaining = graph.len();

        while remaining > 0 {
            // Declaration order is the tie-break within a layer.
            let mut layer: Vec<&NodeId> = graph
                .nodes()
                .iter()
                .filter(|n| indegree.get(&n.id) == Some(&0))
                .map(|n| &n.id)
                .collect();
            layer.sort_by_key(|id| {
                graph
                    .node(id)
                    .map_or(usize::MAX, |n| n.declaration_index)
            });

            // The graph is validated acyclic, so a round always makes progress.
            debug_assert!(!layer.is_empty(), "no progress on an acyclic graph");
            if layer.is_empty() {
                break;
            }

            for id in &layer {
                indegree.remove(*id);
                for dependent in graph.dependents_of(id) {
                    if let Some(count) = indegree.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }

            remaining -= layer.len();
            layers.push(layer.into_iter().cloned().collect());
        }

        debug!(
            "Computed provisioning plan: {} nodes in {} layers",
            graph.len(),
            layers.len()
        );

        Self {
            created_at: Utc::now(),
            graph_fingerprint: fingerprint,
            layers,
        }
    }

    /// Returns true if the plan has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Returns the number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Returns the total number of nodes across all layers.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.layers.iter().map(Vec::len).sum()
    }

    /// Returns the layer index a node is scheduled in.
    #[must_use]
    pub fn layer_of(&self, id: &NodeId) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.iter().any(|n| n == id))
    }
}

impl std::fmt::Display for ProvisioningPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.layers.is_empty() {
            return write!(f, "Nothing to provision");
        }

        writeln!(
            f,
            "Provisioning Plan ({} nodes, {} layers):",
            self.node_count(),
            self.layer_count()
        )?;
        for (i, layer) in self.layers.iter().enumerate() {
            let names: Vec<&str> = layer.iter().map(NodeId::as_str).collect();
            writeln!(f, "  layer {i}: {}", names.join(", "))?;
        }
        Ok(())
    }
}
