//! Graph fingerprinting for change detection.
//!
//! This module provides deterministic hashing of declared nodes and
//! whole graphs, used for plan identity and idempotent re-runs.

use sha2::{Digest, Sha256};

use crate::graph::{DependencyGraph, PropertyValue, ResourceNode};

/// Hasher for computing node and graph fingerprints.
#[derive(Debug, Default)]
pub struct GraphHasher;

impl GraphHasher {
    /// Creates a new graph hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a fingerprint of the entire graph.
    ///
    /// The fingerprint changes when any node, property, or edge changes.
    #[must_use]
    pub fn hash_graph(&self, graph: &DependencyGraph) -> String {
        let mut hasher = Sha256::new();

        // Nodes are stored in declaration order, so this is stable.
        for node in graph.nodes() {
            hasher.update(self.hash_node(node).as_bytes());
        }

        for edge in graph.edges() {
            hasher.update(edge.consumer.as_str().as_bytes());
            hasher.update(edge.property.as_bytes());
            hasher.update(edge.producer.as_str().as_bytes());
            hasher.update(edge.output.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a fingerprint for a single node's declaration.
    ///
    /// Used to detect changes to individual resources between runs.
    #[must_use]
    pub fn hash_node(&self, node: &ResourceNode) -> String {
        let mut hasher = Sha256::new();

        hasher.update(node.id.as_str().as_bytes());
        hasher.update(node.kind.to_string().as_bytes());

        for output in &node.output_contract {
            hasher.update(output.as_bytes());
        }

        // Properties are a BTreeMap, so iteration order is deterministic.
        for (key, value) in &node.properties {
            hasher.update(key.as_bytes());
            match value {
                PropertyValue::Literal(literal) => {
                    hasher.update(b"lit:");
                    hasher.update(literal.to_string().as_bytes());
                }
                PropertyValue::Reference { producer, output } => {
                    hasher.update(b"ref:");
                    hasher.update(producer.as_str().as_bytes());
                    hasher.update(b".");
                    hasher.update(output.as_bytes());
                }
            }
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
