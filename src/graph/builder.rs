//! Dependency graph construction from declared configuration.
//!
//! The builder aggregates all declared nodes and resolved references
//! into a [`DependencyGraph`], rejecting duplicates, dangling
//! references, contract violations, and cycles before any plan exists.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use crate::config::{DeployConfig, ResourceConfig};
use crate::error::{ConfigError, GraphError, GroundplanError, Result};

use super::node::{NodeId, NodeState, ResourceNode};
use super::reference::{PropertyValue, RawReference, Reference};
use super::{DependencyGraph, ExportTarget};

/// Builder assembling declared resources into a validated DAG.
#[derive(Debug, Default)]
pub struct GraphBuilder;

/// DFS marking for cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds a dependency graph from the declared configuration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateResource`, `UnresolvedReference`,
    /// `UnknownOutputKey`, or `CyclicDependency` on an invalid
    /// declaration; no partial graph is produced.
    pub fn build(&self, config: &DeployConfig) -> Result<DependencyGraph> {
        let mut nodes: Vec<ResourceNode> = Vec::with_capacity(config.resource_count());
        let mut seen: HashSet<NodeId> = HashSet::new();

        // Collect nodes in declaration order, classifying properties.
        for unit in &config.units {
            for resource in &unit.resources {
                let id = NodeId::new(&unit.name, &resource.name);
                if !seen.insert(id.clone()) {
                    return Err(GroundplanError::Graph(GraphError::DuplicateResource {
                        id: resource.name.clone(),
                        unit: unit.name.clone(),
                    }));
                }

                let node = Self::build_node(id, resource, &unit.name, nodes.len())?;
                nodes.push(node);
            }
        }

        debug!("Collected {} declared nodes", nodes.len());

        // Resolve references into edges, checking producers and contracts.
        let edges = Self::collect_edges(&nodes)?;

        // Validate unit exports through the same reference machinery.
        let exports = Self::collect_exports(config, &nodes)?;

        let graph = DependencyGraph::new(nodes, edges, exports);
        Self::check_acyclic(&graph)?;

        debug!(
            "Built dependency graph: {} nodes, {} edges",
            graph.len(),
            graph.edges().len()
        );
        Ok(graph)
    }

    /// Builds a single node from its declaration.
    fn build_node(
        id: NodeId,
        resource: &ResourceConfig,
        unit: &str,
        declaration_index: usize,
    ) -> Result<ResourceNode> {
        let output_contract = resource.kind.builtin_outputs().map_or_else(
            || resource.outputs.clone(),
            |outputs| outputs.iter().map(|o| (*o).to_string()).collect(),
        );

        let mut properties = BTreeMap::new();
        for (key, value) in &resource.properties {
            let classified = PropertyValue::classify(value, unit).map_err(|message| {
                GroundplanError::Config(ConfigError::InvalidReference {
                    value: value.as_str().unwrap_or_default().to_string(),
                    message,
                })
            })?;
            properties.insert(key.clone(), classified);
        }

        Ok(ResourceNode {
            id,
            kind: resource.kind.clone(),
            properties,
            output_contract,
            outputs: BTreeMap::new(),
            state: NodeState::Pending,
            declaration_index,
        })
    }

    /// Walks every node's properties and records reference edges,
    /// rejecting dangling producers and contract violations.
    fn collect_edges(nodes: &[ResourceNode]) -> Result<Vec<Reference>> {
        let by_id: HashMap<&NodeId, &ResourceNode> = nodes.iter().map(|n| (&n.id, n)).collect();
        let mut edges = Vec::new();

        for node in nodes {
            for (property, value) in &node.properties {
                let PropertyValue::Reference { producer, output } = value else {
                    continue;
                };

                let Some(producer_node) = by_id.get(producer) else {
                    return Err(GroundplanError::Graph(GraphError::UnresolvedReference {
                        consumer: node.id.to_string(),
                        producer: producer.to_string(),
                    }));
                };

                if !producer_node.declares_output(output) {
                    return Err(GroundplanError::Graph(GraphError::UnknownOutputKey {
                        producer: producer.to_string(),
                        kind: producer_node.kind.to_string(),
                        output: output.clone(),
                        consumer: node.id.to_string(),
                    }));
                }

                edges.push(Reference {
                    consumer: node.id.clone(),
                    property: property.clone(),
                    producer: producer.clone(),
                    output: output.clone(),
                });
            }
        }

        Ok(edges)
    }

    /// Parses and validates unit export declarations.
    fn collect_exports(
        config: &DeployConfig,
        nodes: &[ResourceNode],
    ) -> Result<BTreeMap<String, BTreeMap<String, ExportTarget>>> {
        let by_id: HashMap<&NodeId, &ResourceNode> = nodes.iter().map(|n| (&n.id, n)).collect();
        let mut exports = BTreeMap::new();

        for unit in &config.units {
            let mut targets = BTreeMap::new();
            for (key, expr) in &unit.exports {
                let raw = RawReference::parse(expr)
                    .map_err(|message| {
                        GroundplanError::Config(ConfigError::InvalidReference {
                            value: expr.clone(),
                            message,
                        })
                    })?
                    .ok_or_else(|| {
                        GroundplanError::Config(ConfigError::InvalidReference {
                            value: expr.clone(),
                            message: format!("export '{key}' must be a ${{node.output}} expression"),
                        })
                    })?;

                let producer = raw.qualify(&unit.name);
                let Some(producer_node) = by_id.get(&producer) else {
                    return Err(GroundplanError::Graph(GraphError::UnresolvedReference {
                        consumer: format!("{}:exports.{key}", unit.name),
                        producer: producer.to_string(),
                    }));
                };

                if !producer_node.declares_output(&raw.output) {
                    return Err(GroundplanError::Graph(GraphError::UnknownOutputKey {
                        producer: producer.to_string(),
                        kind: producer_node.kind.to_string(),
                        output: raw.output.clone(),
                        consumer: format!("{}:exports.{key}", unit.name),
                    }));
                }

                targets.insert(
                    key.clone(),
                    ExportTarget {
                        producer,
                        output: raw.output,
                    },
                );
            }
            if !targets.is_empty() {
                exports.insert(unit.name.clone(), targets);
            }
        }

        Ok(exports)
    }

    /// Depth-first cycle check with three-color marking.
    ///
    /// A back-edge to a gray node is a cycle; the error names the node
    /// sequence forming it.
    fn check_acyclic(graph: &DependencyGraph) -> Result<()> {
        let mut colors: HashMap<&NodeId, Color> =
            graph.nodes().iter().map(|n| (&n.id, Color::White)).collect();

        for node in graph.nodes() {
            if colors[&node.id] == Color::White {
                let mut path = Vec::new();
                Self::visit(graph, &node.id, &mut colors, &mut path)?;
            }
        }

        Ok(())
    }

    fn visit<'a>(
        graph: &'a DependencyGraph,
        id: &'a NodeId,
        colors: &mut HashMap<&'a NodeId, Color>,
        path: &mut Vec<&'a NodeId>,
    ) -> Result<()> {
        colors.insert(id, Color::Gray);
        path.push(id);

        for dep in graph.dependencies_of(id) {
            match colors[dep] {
                Color::Gray => {
                    let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                    let mut cycle: Vec<&str> =
                        path[start..].iter().map(|p| p.as_str()).collect();
                    cycle.push(dep.as_str());
                    return Err(GroundplanError::Graph(GraphError::CyclicDependency {
                        cycle: cycle.join(" -> "),
                    }));
                }
                Color::White => Self::visit(graph, dep, colors, path)?,
                Color::Black => {}
            }
        }

        path.pop();
        colors.insert(id, Color::Black);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::GroundplanError;

    fn build(yaml: &str) -> Result<DependencyGraph> {
        let config = ConfigParser::new().parse_yaml(yaml, None)?;
        GraphBuilder::new().build(&config)
    }

    #[test]
    fn test_build_queue_alarm_graph() {
        let graph = build(
            r#"
project:
  name: test
units:
  - name: messaging
    resources:
      - name: queue
        kind: queue
        properties:
          visibility_timeout_secs: 300
      - name: alarm
        kind: alarm
        properties:
          threshold: 1
          queue_arn: "${queue.arn}"
"#,
        )
        .unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);

        let alarm = NodeId::new("messaging", "alarm");
        let queue = NodeId::new("messaging", "queue");
        assert!(graph.dependencies_of(&alarm).contains(&queue));
    }

    #[test]
    fn test_duplicate_resource() {
        let result = build(
            r"
project:
  name: test
units:
  - name: messaging
    resources:
      - name: queue
        kind: queue
      - name: queue
        kind: queue
",
        );

        assert!(matches!(
            result,
            Err(GroundplanError::Graph(GraphError::DuplicateResource { .. }))
        ));
    }

    #[test]
    fn test_same_name_in_different_units_allowed() {
        let graph = build(
            r"
project:
  name: test
units:
  - name: east
    resources:
      - name: queue
        kind: queue
  - name: west
    resources:
      - name: queue
        kind: queue
",
        )
        .unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_unresolved_reference() {
        let result = build(
            r#"
project:
  name: test
units:
  - name: monitoring
    resources:
      - name: alarm
        kind: alarm
        properties:
          queue_arn: "${queue.arn}"
"#,
        );

        assert!(matches!(
            result,
            Err(GroundplanError::Graph(GraphError::UnresolvedReference { .. }))
        ));
    }

    #[test]
    fn test_unknown_output_key() {
        let result = build(
            r#"
project:
  name: test
units:
  - name: messaging
    resources:
      - name: queue
        kind: queue
      - name: alarm
        kind: alarm
        properties:
          queue_endpoint: "${queue.endpoint}"
"#,
        );

        assert!(matches!(
            result,
            Err(GroundplanError::Graph(GraphError::UnknownOutputKey { .. }))
        ));
    }

    #[test]
    fn test_cycle_detected_and_named() {
        let result = build(
            r#"
project:
  name: test
units:
  - name: core
    resources:
      - name: a
        kind: cluster
        properties:
          peer: "${b.id}"
      - name: b
        kind: cluster
        properties:
          peer: "${a.id}"
"#,
        );

        match result {
            Err(GroundplanError::Graph(GraphError::CyclicDependency { cycle })) => {
                assert!(cycle.contains("core/a"));
                assert!(cycle.contains("core/b"));
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let result = build(
            r#"
project:
  name: test
units:
  - name: core
    resources:
      - name: a
        kind: cluster
        properties:
          peer: "${a.id}"
"#,
        );

        assert!(matches!(
            result,
            Err(GroundplanError::Graph(GraphError::CyclicDependency { .. }))
        ));
    }

    #[test]
    fn test_exports_validated() {
        let result = build(
            r#"
project:
  name: test
units:
  - name: messaging
    resources:
      - name: queue
        kind: queue
    exports:
      queue_endpoint: "${queue.endpoint}"
"#,
        );

        assert!(matches!(
            result,
            Err(GroundplanError::Graph(GraphError::UnknownOutputKey { .. }))
        ));
    }

    #[test]
    fn test_custom_kind_contract() {
        let graph = build(
            r#"
project:
  name: test
units:
  - name: core
    resources:
      - name: parameter
        kind: parameter-store
        outputs: ["name"]
      - name: consumer
        kind: service
        properties:
          parameter_name: "${parameter.name}"
"#,
        )
        .unwrap();
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_mid_string_interpolation_rejected() {
        let result = build(
            r#"
project:
  name: test
units:
  - name: messaging
    resources:
      - name: queue
        kind: queue
      - name: alarm
        kind: alarm
        properties:
          description: "watches ${queue.arn}"
"#,
        );

        assert!(matches!(
            result,
            Err(GroundplanError::Config(ConfigError::InvalidReference { .. }))
        ));
    }
}
