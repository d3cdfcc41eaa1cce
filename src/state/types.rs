//! State types for tracking provisioned resources.
//!
//! These types record what previous runs actually provisioned, and
//! feed the idempotence check on the next run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::exec::{PriorResource, PriorState, RunReport};
use crate::graph::{DependencyGraph, NodeId, NodeState, ResourceKind};
use crate::planner::GraphHasher;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// The complete recorded state of a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Fingerprint of the last applied graph.
    pub graph_fingerprint: String,
    /// Recorded resources, keyed by qualified node identifier.
    pub resources: BTreeMap<String, ResourceState>,
    /// Resolved unit exports from the last run.
    #[serde(default)]
    pub exports: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Run history (recent entries).
    #[serde(default)]
    pub history: Vec<RunHistoryEntry>,
}

/// Recorded state of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Qualified node identifier (`unit/name`).
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Provider-assigned identifier.
    pub remote_id: String,
    /// Fingerprint of the node declaration that was provisioned.
    pub spec_hash: String,
    /// Status at the end of the last run that touched this resource.
    pub status: NodeState,
    /// Outputs recorded when the resource was provisioned.
    pub outputs: BTreeMap<String, serde_json::Value>,
    /// When the resource was first provisioned.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Fingerprint of the graph the run executed against.
    pub graph_fingerprint: String,
    /// Nodes the provider actually provisioned.
    pub provisioned: usize,
    /// Nodes reused without a provider call.
    pub unchanged: usize,
    /// Nodes that failed.
    pub failed: usize,
    /// Nodes that were skipped.
    pub skipped: usize,
    /// Whether the run succeeded.
    pub success: bool,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl RunState {
    /// Creates a new empty run state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            graph_fingerprint: String::new(),
            resources: BTreeMap::new(),
            exports: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource record by qualified identifier.
    #[must_use]
    pub fn get_resource(&self, id: &str) -> Option<&ResourceState> {
        self.resources.get(id)
    }

    /// Adds or replaces a resource record.
    pub fn set_resource(&mut self, resource: ResourceState) {
        self.resources.insert(resource.id.clone(), resource);
        self.last_updated = Utc::now();
    }

    /// Removes a resource record by qualified identifier.
    pub fn remove_resource(&mut self, id: &str) -> Option<ResourceState> {
        let result = self.resources.remove(id);
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Returns all qualified resource identifiers.
    #[must_use]
    pub fn resource_ids(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Builds the prior-run view the executor consumes.
    ///
    /// Only resources that finished a previous run provisioned
    /// participate in the unchanged check.
    #[must_use]
    pub fn prior_state(&self) -> PriorState {
        self.resources
            .values()
            .filter(|r| r.status == NodeState::Provisioned)
            .map(|r| {
                (
                    NodeId::from_qualified(r.id.clone()),
                    PriorResource {
                        remote_id: r.remote_id.clone(),
                        spec_hash: r.spec_hash.clone(),
                        outputs: r.outputs.clone(),
                    },
                )
            })
            .collect()
    }

    /// Folds a finished run back into the state.
    ///
    /// Provisioned nodes are upserted with their fresh outputs and
    /// declaration fingerprint; failed nodes keep their old record but
    /// have the failure noted.
    pub fn record_run(&mut self, report: &RunReport, graph: &DependencyGraph) {
        let hasher = GraphHasher;
        let now = Utc::now();

        for node_report in &report.nodes {
            let key = node_report.id.to_string();
            match node_report.state {
                NodeState::Provisioned => {
                    let Some(node) = graph.node(&node_report.id) else {
                        continue;
                    };
                    let Some(remote_id) = node_report.remote_id.clone() else {
                        continue;
                    };
                    let created_at = self
                        .resources
                        .get(&key)
                        .map_or(now, |existing| existing.created_at);
                    self.resources.insert(
                        key.clone(),
                        ResourceState {
                            id: key,
                            kind: node.kind.clone(),
                            remote_id,
                            spec_hash: hasher.hash_node(node),
                            status: NodeState::Provisioned,
                            outputs: node.outputs.clone(),
                            created_at,
                            updated_at: now,
                        },
                    );
                }
                NodeState::Failed => {
                    if let Some(existing) = self.resources.get_mut(&key) {
                        existing.status = NodeState::Failed;
                        existing.updated_at = now;
                    }
                }
                _ => {}
            }
        }

        self.graph_fingerprint = report.graph_fingerprint.clone();
        self.exports = graph.resolved_exports();
        self.add_history(RunHistoryEntry {
            timestamp: report.finished_at,
            graph_fingerprint: report.graph_fingerprint.clone(),
            provisioned: report.provisioned_count(),
            unchanged: report.unchanged_count(),
            failed: report.failed_count(),
            skipped: report.skipped_count(),
            success: report.success,
            cancelled: report.cancelled,
        });
        self.last_updated = now;
    }

    /// Adds a history entry.
    pub fn add_history(&mut self, entry: RunHistoryEntry) {
        // Keep only the last 100 entries
        const MAX_HISTORY: usize = 100;
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}
