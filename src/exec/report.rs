//! Outcome reporting for a provisioning run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::graph::{NodeId, NodeState, ResourceKind};

/// Per-node outcome of a provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Qualified node identifier.
    pub id: NodeId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Terminal state of the node for this run.
    pub state: NodeState,
    /// Index of the plan layer the node belongs to.
    pub layer: usize,
    /// True when the node was up to date and no provider call was made.
    pub reused: bool,
    /// Provider-assigned identifier, when the node is provisioned.
    pub remote_id: Option<String>,
    /// When the provider call started, if one was made.
    pub started_at: Option<DateTime<Utc>>,
    /// When the provider call finished, if one was made.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure or skip reason, when the node did not provision.
    pub reason: Option<String>,
}

/// Aggregate outcome of a provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Fingerprint of the graph the run executed against.
    pub graph_fingerprint: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// True when no node failed.
    pub success: bool,
    /// True when the run was cancelled before completing.
    pub cancelled: bool,
    /// Per-node outcomes in declaration order.
    pub nodes: Vec<NodeReport>,
}

impl RunReport {
    /// Number of nodes the provider actually provisioned.
    #[must_use]
    pub fn provisioned_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Provisioned && !n.reused)
            .count()
    }

    /// Number of nodes reused from a previous run without a provider call.
    #[must_use]
    pub fn unchanged_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.reused).count()
    }

    /// Number of nodes that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Failed)
            .count()
    }

    /// Number of nodes skipped because of failures or cancellation.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Skipped)
            .count()
    }

    /// Nodes that reached the given terminal state.
    pub fn nodes_in_state(&self, state: NodeState) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(move |n| n.state == state)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self.finished_at - self.started_at;
        write!(
            f,
            "{} provisioned, {} unchanged, {} failed, {} skipped in {}ms",
            self.provisioned_count(),
            self.unchanged_count(),
            self.failed_count(),
            self.skipped_count(),
            elapsed.num_milliseconds()
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, state: NodeState, reused: bool) -> NodeReport {
        NodeReport {
            id: NodeId::new("app", name),
            kind: ResourceKind::Queue,
            state,
            layer: 0,
            reused,
            remote_id: None,
            started_at: None,
            finished_at: None,
            reason: None,
        }
    }

    #[test]
    fn test_report_counts() {
        let now = Utc::now();
        let report = RunReport {
            graph_fingerprint: String::from("abc"),
            started_at: now,
            finished_at: now,
            success: false,
            cancelled: false,
            nodes: vec![
                node("a", NodeState::Provisioned, false),
                node("b", NodeState::Provisioned, true),
                node("c", NodeState::Failed, false),
                node("d", NodeState::Skipped, false),
            ],
        };

        assert_eq!(report.provisioned_count(), 1);
        assert_eq!(report.unchanged_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.nodes_in_state(NodeState::Failed).count(), 1);
        assert!(report.to_string().contains("1 failed"));
    }
}
