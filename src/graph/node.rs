//! Resource node types for the dependency graph.
//!
//! A node is a single declared unit of infrastructure with typed
//! properties and a declared output contract. Nodes are created at
//! declaration time and mutated only by the executor as provisioning
//! progresses.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::reference::PropertyValue;

/// Unit-qualified identifier of a resource node, rendered `unit/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node identifier from a unit and resource name.
    #[must_use]
    pub fn new(unit: &str, name: &str) -> Self {
        Self(format!("{unit}/{name}"))
    }

    /// Parses a node identifier from its `unit/name` form.
    #[must_use]
    pub fn from_qualified(qualified: impl Into<String>) -> Self {
        Self(qualified.into())
    }

    /// Returns the unit component.
    #[must_use]
    pub fn unit(&self) -> &str {
        self.0.split_once('/').map_or("", |(unit, _)| unit)
    }

    /// Returns the resource name component.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Returns the full `unit/name` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource kinds with built-in output contracts, plus custom kinds
/// whose contract is declared inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A message queue (outputs: `arn`, `url`).
    Queue,
    /// A metric alarm (outputs: `arn`).
    Alarm,
    /// A container image repository (outputs: `arn`, `uri`).
    Repository,
    /// A container cluster (outputs: `arn`, `id`).
    Cluster,
    /// A container service (outputs: `arn`, `name`).
    Service,
    /// A custom kind; its output contract comes from the declaration.
    #[serde(untagged)]
    Custom(String),
}

impl ResourceKind {
    /// Returns the built-in output contract for this kind, or `None`
    /// for custom kinds.
    #[must_use]
    pub fn builtin_outputs(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Queue => Some(&["arn", "url"]),
            Self::Alarm => Some(&["arn"]),
            Self::Repository => Some(&["arn", "uri"]),
            Self::Cluster => Some(&["arn", "id"]),
            Self::Service => Some(&["arn", "name"]),
            Self::Custom(_) => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queue => "queue",
            Self::Alarm => "alarm",
            Self::Repository => "repository",
            Self::Cluster => "cluster",
            Self::Service => "service",
            Self::Custom(name) => name,
        };
        write!(f, "{s}")
    }
}

/// Lifecycle state of a node during a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Declared, not yet dispatched.
    Pending,
    /// Provider call in flight.
    Provisioning,
    /// Successfully provisioned; outputs recorded.
    Provisioned,
    /// Provider call failed; error recorded.
    Failed,
    /// Never dispatched (dependency failure, abort, or cancellation).
    Skipped,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Provisioned => "provisioned",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// A single declared unit of infrastructure.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Unit-qualified identifier.
    pub id: NodeId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Declared properties, each a literal or a reference.
    pub properties: BTreeMap<String, PropertyValue>,
    /// Output keys this node's kind contract declares.
    pub output_contract: Vec<String>,
    /// Concrete outputs, populated after provisioning.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// Current lifecycle state.
    pub state: NodeState,
    /// Position in declaration order, used for deterministic planning.
    pub declaration_index: usize,
}

impl ResourceNode {
    /// Returns true if the kind contract declares the given output key.
    #[must_use]
    pub fn declares_output(&self, key: &str) -> bool {
        self.output_contract.iter().any(|o| o == key)
    }

    /// Returns the producers this node's properties reference, in
    /// property-key order.
    #[must_use]
    pub fn referenced_producers(&self) -> Vec<&NodeId> {
        self.properties
            .values()
            .filter_map(|v| match v {
                PropertyValue::Reference { producer, .. } => Some(producer),
                PropertyValue::Literal(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_components() {
        let id = NodeId::new("messaging", "queue");
        assert_eq!(id.unit(), "messaging");
        assert_eq!(id.name(), "queue");
        assert_eq!(id.to_string(), "messaging/queue");
    }

    #[test]
    fn test_builtin_output_contracts() {
        assert_eq!(ResourceKind::Queue.builtin_outputs(), Some(&["arn", "url"][..]));
        assert_eq!(ResourceKind::Alarm.builtin_outputs(), Some(&["arn"][..]));
        assert!(ResourceKind::Custom(String::from("topic")).builtin_outputs().is_none());
    }

    #[test]
    fn test_kind_serde_roundtrip() {
        let kind: ResourceKind = serde_yaml::from_str("queue").unwrap();
        assert_eq!(kind, ResourceKind::Queue);

        let kind: ResourceKind = serde_yaml::from_str("parameter-store").unwrap();
        assert_eq!(kind, ResourceKind::Custom(String::from("parameter-store")));
    }
}
