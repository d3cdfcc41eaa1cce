//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::collections::BTreeMap;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::exec::{PriorState, RunReport};
use crate::graph::{DependencyGraph, NodeState};
use crate::planner::{GraphHasher, ProvisioningPlan};
use crate::state::RunState;

use super::commands::OutputFormat;

/// What a plan will do to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanAction {
    Create,
    Update,
    Unchanged,
}

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Layer")]
    layer: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Action")]
    action: String,
}

/// Run result row for table display.
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a provisioning plan for display.
    #[must_use]
    pub fn format_plan(
        &self,
        plan: &ProvisioningPlan,
        graph: &DependencyGraph,
        prior: &PriorState,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::new(plan, graph, prior)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, graph, prior),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(
        plan: &ProvisioningPlan,
        graph: &DependencyGraph,
        prior: &PriorState,
    ) -> String {
        if plan.is_empty() {
            return format!("{} Nothing to provision.\n", "✓".green());
        }

        let mut output = String::new();

        let _ = write!(output, "\nProvisioning Plan\n");
        let _ = write!(
            output,
            "   Graph fingerprint: {}\n\n",
            GraphHasher::short_hash(&plan.graph_fingerprint)
        );

        let mut rows = Vec::new();
        let mut creates = 0usize;
        let mut updates = 0usize;
        let mut unchanged = 0usize;
        for (layer_idx, layer) in plan.layers.iter().enumerate() {
            for id in layer {
                let Some(node) = graph.node(id) else { continue };
                let action = plan_action(graph, prior, id);
                match action {
                    PlanAction::Create => creates += 1,
                    PlanAction::Update => updates += 1,
                    PlanAction::Unchanged => unchanged += 1,
                }
                rows.push(PlanRow {
                    layer: layer_idx,
                    resource: id.to_string(),
                    kind: node.kind.to_string(),
                    action: Self::format_plan_action(action),
                });
            }
        }

        let table = Table::new(rows).to_string();
        output.push_str(&table);
        output.push('\n');

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} unchanged\n",
            creates.to_string().green(),
            updates.to_string().yellow(),
            unchanged.to_string().dimmed()
        );

        output
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a run report as text.
    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();

        let rows: Vec<ReportRow> = report
            .nodes
            .iter()
            .map(|n| {
                let detail = if n.reused {
                    String::from("unchanged")
                } else {
                    match (&n.reason, &n.remote_id) {
                        (Some(reason), _) => Self::truncate(reason, 50),
                        (None, Some(remote_id)) => remote_id.clone(),
                        (None, None) => String::new(),
                    }
                };
                ReportRow {
                    resource: n.id.to_string(),
                    state: Self::format_node_state(n.state),
                    detail,
                }
            })
            .collect();

        let table = Table::new(rows).to_string();
        output.push_str(&table);
        output.push('\n');

        let headline = if report.success {
            format!("{} {report}", "✓".green())
        } else {
            format!("{} {report}", "✗".red())
        };
        let _ = write!(output, "\n{headline}\n");

        output
    }

    /// Formats recorded outputs and unit exports.
    #[must_use]
    pub fn format_outputs(
        &self,
        exports: &BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    ) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(exports).unwrap_or_default(),
            OutputFormat::Text => {
                if exports.is_empty() {
                    return String::from("No exports recorded.\n");
                }

                let mut output = String::new();
                for (unit, values) in exports {
                    let _ = writeln!(output, "\n{}:", unit.bold());
                    for (key, value) in values {
                        let rendered = match value {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        let _ = writeln!(output, "   {key} = {rendered}");
                    }
                }
                output
            }
        }
    }

    /// Formats recorded state.
    #[must_use]
    pub fn format_state(&self, state: &RunState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\nState: {}/{}\n\n", state.project, state.environment);
                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(
                    output,
                    "   Graph fingerprint: {}",
                    GraphHasher::short_hash(&state.graph_fingerprint)
                );
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.resources.len());

                if !state.resources.is_empty() {
                    output.push('\n');
                    for resource in state.resources.values() {
                        let _ = writeln!(
                            output,
                            "   {} [{}] {} ({})",
                            Self::format_node_state(resource.status),
                            resource.kind,
                            resource.id,
                            resource.remote_id
                        );
                    }
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(5) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = writeln!(
                            output,
                            "     {status} {} - {} provisioned, {} unchanged, {} failed",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.provisioned,
                            entry.unchanged,
                            entry.failed
                        );
                    }
                }

                output
            }
        }
    }

    /// Formats a plan action with color.
    fn format_plan_action(action: PlanAction) -> String {
        match action {
            PlanAction::Create => "+create".green().to_string(),
            PlanAction::Update => "~update".yellow().to_string(),
            PlanAction::Unchanged => "noop".dimmed().to_string(),
        }
    }

    /// Formats a node state with color.
    fn format_node_state(state: NodeState) -> String {
        match state {
            NodeState::Provisioned => "provisioned".green().to_string(),
            NodeState::Provisioning => "provisioning".yellow().to_string(),
            NodeState::Failed => "failed".red().to_string(),
            NodeState::Skipped => "skipped".yellow().to_string(),
            NodeState::Pending => "pending".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    ///
    /// Counts characters rather than bytes, so multi-byte text in a
    /// provider error message never splits mid-character.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }
}

/// Computes what applying the plan would do to a node.
fn plan_action(graph: &DependencyGraph, prior: &PriorState, id: &crate::graph::NodeId) -> PlanAction {
    let hasher = GraphHasher;
    graph.node(id).map_or(PlanAction::Create, |node| {
        prior.get(id).map_or(PlanAction::Create, |previous| {
            if previous.spec_hash == hasher.hash_node(node) {
                PlanAction::Unchanged
            } else {
                PlanAction::Update
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string_untouched() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(OutputFormatter::truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_truncate_multibyte_reason() {
        let reason = "Fehler beim Bereitstellen: Warteschlange \u{fc}berf\u{fc}llt \u{2014} Kapazit\u{e4}t \u{fc}berschritten";
        let cut = OutputFormatter::truncate(reason, 50);
        assert_eq!(cut.chars().count(), 50);
        assert!(cut.ends_with("..."));
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    graph_fingerprint: String,
    layer_count: usize,
    node_count: usize,
    creates: usize,
    updates: usize,
    unchanged: usize,
    layers: Vec<Vec<PlanNodeJson>>,
}

#[derive(serde::Serialize)]
struct PlanNodeJson {
    id: String,
    kind: String,
    action: String,
}

impl PlanJson {
    fn new(plan: &ProvisioningPlan, graph: &DependencyGraph, prior: &PriorState) -> Self {
        let mut creates = 0usize;
        let mut updates = 0usize;
        let mut unchanged = 0usize;

        let layers = plan
            .layers
            .iter()
            .map(|layer| {
                layer
                    .iter()
                    .map(|id| {
                        let action = plan_action(graph, prior, id);
                        match action {
                            PlanAction::Create => creates += 1,
                            PlanAction::Update => updates += 1,
                            PlanAction::Unchanged => unchanged += 1,
                        }
                        PlanNodeJson {
                            id: id.to_string(),
                            kind: graph
                                .node(id)
                                .map_or_else(String::new, |n| n.kind.to_string()),
                            action: format!("{action:?}").to_lowercase(),
                        }
                    })
                    .collect()
            })
            .collect();

        Self {
            graph_fingerprint: plan.graph_fingerprint.clone(),
            layer_count: plan.layer_count(),
            node_count: plan.node_count(),
            creates,
            updates,
            unchanged,
            layers,
        }
    }
}
