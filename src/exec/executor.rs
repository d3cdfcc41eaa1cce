//! Layered plan execution.
//!
//! The executor walks the plan one layer at a time. Within a layer,
//! nodes are dispatched concurrently up to the configured parallelism;
//! the layer boundary is a hard barrier, so every producer has finished
//! before any consumer resolves its references.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::FailurePolicy;
use crate::error::{ExecError, GroundplanError, Result};
use crate::exec::provider::{ProvisionedResource, ResourceProvider, ResourceRequest};
use crate::exec::report::{NodeReport, RunReport};
use crate::graph::{DependencyGraph, NodeId, NodeState, PropertyValue};
use crate::planner::{GraphHasher, ProvisioningPlan};

/// Cooperative cancellation signal for a run.
///
/// Cancellation is observed between dispatches: in-flight provider
/// calls are allowed to finish, and everything not yet started is
/// marked skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the run this token was handed to.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a previous run recorded for a node.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorResource {
    /// Provider-assigned identifier from the earlier run.
    pub remote_id: String,
    /// Fingerprint of the node declaration that was provisioned.
    pub spec_hash: String,
    /// Outputs recorded by the earlier run.
    pub outputs: BTreeMap<String, serde_json::Value>,
}

/// Prior run records keyed by node identifier.
pub type PriorState = BTreeMap<NodeId, PriorResource>;

struct NodeOutcome {
    reused: bool,
    remote_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    reason: Option<String>,
}

struct TaskResult {
    id: NodeId,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    result: Result<ProvisionedResource>,
}

/// Executes a provisioning plan against a provider.
pub struct PlanExecutor {
    provider: Arc<dyn ResourceProvider>,
    parallelism: usize,
    on_failure: FailurePolicy,
    cancel: CancelToken,
}

impl PlanExecutor {
    /// Creates an executor with default settings.
    #[must_use]
    pub fn new(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            parallelism: 4,
            on_failure: FailurePolicy::Abort,
            cancel: CancelToken::new(),
        }
    }

    /// Sets the per-layer concurrency bound. A bound of zero is
    /// treated as one.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the plan, mutating node states and outputs on the graph.
    ///
    /// Nodes unchanged since the prior run are reused without a
    /// provider call, provided every producer they reference was also
    /// reused; changed nodes are updated in place; new nodes are
    /// created. Every node ends the run in a terminal state.
    pub async fn execute(
        &self,
        plan: &ProvisioningPlan,
        graph: &mut DependencyGraph,
        prior: &PriorState,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let hasher = GraphHasher;
        let fingerprint = hasher.hash_graph(graph);

        info!(
            "Starting run: {} nodes in {} layers (parallelism {}, on failure: {})",
            plan.node_count(),
            plan.layer_count(),
            self.parallelism,
            self.on_failure
        );

        let mut outcomes: HashMap<NodeId, NodeOutcome> = HashMap::new();
        let mut blocked: HashSet<NodeId> = HashSet::new();
        let mut reused_ids: HashSet<NodeId> = HashSet::new();
        let mut halted = false;
        let mut cancelled = false;

        for (layer_idx, layer) in plan.layers.iter().enumerate() {
            if !halted && self.cancel.is_cancelled() {
                cancelled = true;
                halted = true;
            }

            if halted {
                let reason = if cancelled {
                    "run cancelled"
                } else {
                    "run aborted after earlier failure"
                };
                for id in layer {
                    mark_skipped(graph, &mut outcomes, id, reason.to_string());
                    blocked.insert(id.clone());
                }
                continue;
            }

            debug!("Dispatching layer {layer_idx} ({} nodes)", layer.len());
            let semaphore = Arc::new(Semaphore::new(self.parallelism));
            let mut join_set: JoinSet<TaskResult> = JoinSet::new();
            let mut layer_failed = false;

            for id in layer {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    mark_skipped(graph, &mut outcomes, id, String::from("run cancelled"));
                    blocked.insert(id.clone());
                    continue;
                }

                let blocked_dep = graph
                    .dependencies_of(id)
                    .into_iter()
                    .find(|d| blocked.contains(*d))
                    .cloned();
                if let Some(dep) = blocked_dep {
                    let reason = format!("dependency '{dep}' did not provision");
                    mark_skipped(graph, &mut outcomes, id, reason);
                    blocked.insert(id.clone());
                    continue;
                }

                let node = graph
                    .node(id)
                    .ok_or_else(|| GroundplanError::internal(format!("plan names unknown node '{id}'")))?;
                let spec_hash = hasher.hash_node(node);

                // A node is reused only when its own declaration is
                // unchanged, its recorded outputs are complete, and
                // every producer it references was itself reused. A
                // created or updated producer carries fresh outputs
                // that must reach its consumers.
                if let Some(previous) = prior.get(id)
                    && previous.spec_hash == spec_hash
                    && node
                        .output_contract
                        .iter()
                        .all(|key| previous.outputs.contains_key(key))
                    && node
                        .referenced_producers()
                        .iter()
                        .all(|producer| reused_ids.contains(*producer))
                {
                    debug!("'{id}' is unchanged, reusing recorded outputs");
                    let remote_id = previous.remote_id.clone();
                    let outputs = previous.outputs.clone();
                    if let Some(node) = graph.node_mut(id) {
                        node.outputs = outputs;
                        node.state = NodeState::Provisioned;
                    }
                    reused_ids.insert(id.clone());
                    outcomes.insert(
                        id.clone(),
                        NodeOutcome {
                            reused: true,
                            remote_id: Some(remote_id),
                            started_at: None,
                            finished_at: None,
                            reason: None,
                        },
                    );
                    continue;
                }

                // References resolve here, on the scheduler side: the
                // layer barrier guarantees every producer has finished.
                let request = match resolve_request(graph, id) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!("'{id}' failed to resolve: {err}");
                        layer_failed = true;
                        blocked.insert(id.clone());
                        mark_failed(graph, &mut outcomes, id, err.to_string());
                        continue;
                    }
                };

                if let Some(node) = graph.node_mut(id) {
                    node.state = NodeState::Provisioning;
                }

                let existing = prior.get(id).map(|p| p.remote_id.clone());
                let provider = Arc::clone(&self.provider);
                let permits = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                let task_id = id.clone();
                join_set.spawn(async move {
                    let permit = permits.acquire_owned().await;
                    let started_at = Utc::now();
                    let result = if permit.is_err() {
                        Err(GroundplanError::internal("provisioning semaphore closed"))
                    } else if cancel.is_cancelled() {
                        Err(ExecError::Cancelled {
                            reason: String::from("run cancelled"),
                        }
                        .into())
                    } else {
                        match &existing {
                            Some(remote_id) => provider.update(remote_id, &request).await,
                            None => provider.create(&request).await,
                        }
                    };
                    TaskResult {
                        id: task_id,
                        started_at,
                        finished_at: Utc::now(),
                        result,
                    }
                });
            }

            // Layer barrier: every in-flight call finishes before the
            // next layer is considered.
            while let Some(joined) = join_set.join_next().await {
                let task = joined.map_err(|e| {
                    GroundplanError::internal(format!("provisioning task panicked: {e}"))
                })?;
                match task.result {
                    Ok(resource) => {
                        info!("'{}' provisioned as '{}'", task.id, resource.remote_id);
                        if let Some(node) = graph.node_mut(&task.id) {
                            node.outputs = resource.outputs;
                            node.state = NodeState::Provisioned;
                        }
                        outcomes.insert(
                            task.id,
                            NodeOutcome {
                                reused: false,
                                remote_id: Some(resource.remote_id),
                                started_at: Some(task.started_at),
                                finished_at: Some(task.finished_at),
                                reason: None,
                            },
                        );
                    }
                    Err(GroundplanError::Exec(ExecError::Cancelled { reason })) => {
                        cancelled = true;
                        if let Some(node) = graph.node_mut(&task.id) {
                            node.state = NodeState::Skipped;
                        }
                        blocked.insert(task.id.clone());
                        outcomes.insert(
                            task.id,
                            NodeOutcome {
                                reused: false,
                                remote_id: None,
                                started_at: None,
                                finished_at: None,
                                reason: Some(reason),
                            },
                        );
                    }
                    Err(err) => {
                        warn!("'{}' failed to provision: {err}", task.id);
                        layer_failed = true;
                        blocked.insert(task.id.clone());
                        let id = task.id.clone();
                        if let Some(node) = graph.node_mut(&task.id) {
                            node.state = NodeState::Failed;
                        }
                        outcomes.insert(
                            id,
                            NodeOutcome {
                                reused: false,
                                remote_id: None,
                                started_at: Some(task.started_at),
                                finished_at: Some(task.finished_at),
                                reason: Some(err.to_string()),
                            },
                        );
                    }
                }
            }

            if layer_failed && self.on_failure == FailurePolicy::Abort {
                warn!("Layer {layer_idx} had failures, aborting remaining layers");
                halted = true;
            }
        }

        let report = build_report(plan, graph, &outcomes, fingerprint, started_at, cancelled);
        info!("Run finished: {report}");
        Ok(report)
    }
}

fn mark_skipped(
    graph: &mut DependencyGraph,
    outcomes: &mut HashMap<NodeId, NodeOutcome>,
    id: &NodeId,
    reason: String,
) {
    debug!("'{id}' skipped: {reason}");
    if let Some(node) = graph.node_mut(id) {
        node.state = NodeState::Skipped;
    }
    outcomes.insert(
        id.clone(),
        NodeOutcome {
            reused: false,
            remote_id: None,
            started_at: None,
            finished_at: None,
            reason: Some(reason),
        },
    );
}

fn mark_failed(
    graph: &mut DependencyGraph,
    outcomes: &mut HashMap<NodeId, NodeOutcome>,
    id: &NodeId,
    reason: String,
) {
    if let Some(node) = graph.node_mut(id) {
        node.state = NodeState::Failed;
    }
    outcomes.insert(
        id.clone(),
        NodeOutcome {
            reused: false,
            remote_id: None,
            started_at: None,
            finished_at: None,
            reason: Some(reason),
        },
    );
}

/// Builds the provider request for a node, replacing each reference
/// with the producer's recorded output value.
fn resolve_request(graph: &DependencyGraph, id: &NodeId) -> Result<ResourceRequest> {
    let node = graph
        .node(id)
        .ok_or_else(|| GroundplanError::internal(format!("unknown node '{id}'")))?;

    let mut properties = BTreeMap::new();
    for (key, value) in &node.properties {
        let resolved = match value {
            PropertyValue::Literal(v) => v.clone(),
            PropertyValue::Reference { producer, output } => {
                let producer_node = graph.node(producer).ok_or_else(|| {
                    GroundplanError::internal(format!("unknown producer '{producer}'"))
                })?;
                producer_node.outputs.get(output).cloned().ok_or_else(|| {
                    GroundplanError::Exec(ExecError::MissingOutput {
                        producer: producer.to_string(),
                        output: output.clone(),
                    })
                })?
            }
        };
        properties.insert(key.clone(), resolved);
    }

    Ok(ResourceRequest {
        id: node.id.clone(),
        kind: node.kind.clone(),
        properties,
        output_contract: node.output_contract.clone(),
    })
}

fn build_report(
    plan: &ProvisioningPlan,
    graph: &DependencyGraph,
    outcomes: &HashMap<NodeId, NodeOutcome>,
    graph_fingerprint: String,
    started_at: DateTime<Utc>,
    cancelled: bool,
) -> RunReport {
    let nodes: Vec<NodeReport> = graph
        .nodes()
        .iter()
        .map(|node| {
            debug_assert!(
                !matches!(node.state, NodeState::Pending | NodeState::Provisioning),
                "node '{}' left in non-terminal state",
                node.id
            );
            let outcome = outcomes.get(&node.id);
            NodeReport {
                id: node.id.clone(),
                kind: node.kind.clone(),
                state: node.state,
                layer: plan.layer_of(&node.id).unwrap_or(0),
                reused: outcome.is_some_and(|o| o.reused),
                remote_id: outcome.and_then(|o| o.remote_id.clone()),
                started_at: outcome.and_then(|o| o.started_at),
                finished_at: outcome.and_then(|o| o.finished_at),
                reason: outcome.and_then(|o| o.reason.clone()),
            }
        })
        .collect();

    let success = nodes.iter().all(|n| n.state != NodeState::Failed);
    RunReport {
        graph_fingerprint,
        started_at,
        finished_at: Utc::now(),
        success,
        cancelled,
        nodes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeployConfig;
    use crate::exec::provider::SimulatedProvider;
    use crate::graph::GraphBuilder;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Test double that records every request and can be scripted to
    /// fail nodes or omit output keys.
    #[derive(Default)]
    struct ScriptedProvider {
        calls: Mutex<Vec<ResourceRequest>>,
        fail: Vec<String>,
        omit_output: Vec<(String, String)>,
    }

    impl ScriptedProvider {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn omitting(node: &str, output: &str) -> Self {
            Self {
                omit_output: vec![(node.to_string(), output.to_string())],
                ..Self::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn requests(&self) -> Vec<ResourceRequest> {
            self.calls.lock().unwrap().clone()
        }

        fn respond(&self, request: &ResourceRequest) -> Result<ProvisionedResource> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail.contains(&request.id.to_string()) {
                return Err(ExecError::provisioning(request.id.to_string(), "scripted failure").into());
            }
            let outputs = request
                .output_contract
                .iter()
                .filter(|key| {
                    !self
                        .omit_output
                        .contains(&(request.id.to_string(), (*key).clone()))
                })
                .map(|key| {
                    let value = format!("out:{}:{key}", request.id);
                    (key.clone(), serde_json::Value::String(value))
                })
                .collect();
            Ok(ProvisionedResource {
                remote_id: format!("r-{}", request.id.name()),
                outputs,
            })
        }
    }

    #[async_trait]
    impl ResourceProvider for ScriptedProvider {
        async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource> {
            self.respond(request)
        }

        async fn update(
            &self,
            remote_id: &str,
            request: &ResourceRequest,
        ) -> Result<ProvisionedResource> {
            let mut resource = self.respond(request)?;
            resource.remote_id = remote_id.to_string();
            Ok(resource)
        }
    }

    /// Provider that blocks inside `create` until released, so a test
    /// can cancel the run while a call is in flight.
    struct GatedProvider {
        entered: AtomicBool,
        gate: Semaphore,
    }

    impl GatedProvider {
        fn new() -> Self {
            Self {
                entered: AtomicBool::new(false),
                gate: Semaphore::new(0),
            }
        }

        fn entered(&self) -> bool {
            self.entered.load(Ordering::SeqCst)
        }

        fn release(&self) {
            self.gate.add_permits(1);
        }
    }

    #[async_trait]
    impl ResourceProvider for GatedProvider {
        async fn create(&self, request: &ResourceRequest) -> Result<ProvisionedResource> {
            self.entered.store(true, Ordering::SeqCst);
            let _permit = self.gate.acquire().await;
            let outputs = request
                .output_contract
                .iter()
                .map(|key| {
                    let value = format!("out:{}:{key}", request.id);
                    (key.clone(), serde_json::Value::String(value))
                })
                .collect();
            Ok(ProvisionedResource {
                remote_id: format!("r-{}", request.id.name()),
                outputs,
            })
        }

        async fn update(
            &self,
            remote_id: &str,
            request: &ResourceRequest,
        ) -> Result<ProvisionedResource> {
            let mut resource = self.create(request).await?;
            resource.remote_id = remote_id.to_string();
            Ok(resource)
        }
    }

    fn build_graph(yaml: &str) -> DependencyGraph {
        let config: DeployConfig = serde_yaml::from_str(yaml).unwrap();
        GraphBuilder::new().build(&config).unwrap()
    }

    const QUEUE_ALARM: &str = r"
project:
  name: messaging
units:
  - name: app
    resources:
      - name: queue
        kind: queue
        properties:
          visibility_timeout: 300
      - name: alarm
        kind: alarm
        properties:
          metric_source: ${queue.arn}
";

    const DIAMOND: &str = r"
project:
  name: diamond
units:
  - name: app
    resources:
      - name: repository
        kind: repository
      - name: cluster
        kind: cluster
      - name: service
        kind: service
        properties:
          image: ${repository.uri}
          cluster: ${cluster.arn}
      - name: alarm
        kind: alarm
        properties:
          metric_source: ${service.arn}
";

    #[tokio::test]
    async fn test_linear_chain_resolves_consumer_property() {
        let mut graph = build_graph(QUEUE_ALARM);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::default());
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>);

        let report = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.provisioned_count(), 2);

        let requests = provider.requests();
        let alarm = requests
            .iter()
            .find(|r| r.id.name() == "alarm")
            .unwrap();
        assert_eq!(
            alarm.properties["metric_source"],
            serde_json::json!("out:app/queue:arn")
        );
    }

    #[tokio::test]
    async fn test_failure_skips_transitive_dependents() {
        let mut graph = build_graph(DIAMOND);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::failing(&["app/repository"]));
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>)
            .with_failure_policy(FailurePolicy::Continue);

        let report = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.failed_count(), 1);
        // service and alarm are downstream of the failed repository
        assert_eq!(report.skipped_count(), 2);
        // cluster is independent and still provisions under continue
        let cluster = graph.node(&NodeId::new("app", "cluster")).unwrap();
        assert_eq!(cluster.state, NodeState::Provisioned);
    }

    #[tokio::test]
    async fn test_abort_policy_skips_remaining_layers() {
        let mut graph = build_graph(DIAMOND);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::failing(&["app/cluster"]));
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>)
            .with_failure_policy(FailurePolicy::Abort);

        let report = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();

        assert!(!report.success);
        // layer 0 still ran in full, later layers never dispatched
        assert_eq!(provider.call_count(), 2);
        let service = graph.node(&NodeId::new("app", "service")).unwrap();
        assert_eq!(service.state, NodeState::Skipped);
        let alarm = graph.node(&NodeId::new("app", "alarm")).unwrap();
        assert_eq!(alarm.state, NodeState::Skipped);
    }

    #[tokio::test]
    async fn test_unchanged_nodes_make_no_provider_calls() {
        let mut graph = build_graph(QUEUE_ALARM);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::default());
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>);

        let first = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 2);

        // carry the first run's records into a second run
        let hasher = GraphHasher;
        let prior: PriorState = graph
            .nodes()
            .iter()
            .map(|node| {
                let record = first
                    .nodes
                    .iter()
                    .find(|n| n.id == node.id)
                    .unwrap();
                (
                    node.id.clone(),
                    PriorResource {
                        remote_id: record.remote_id.clone().unwrap(),
                        spec_hash: hasher.hash_node(node),
                        outputs: node.outputs.clone(),
                    },
                )
            })
            .collect();

        let mut second_graph = build_graph(QUEUE_ALARM);
        let second = executor
            .execute(&plan, &mut second_graph, &prior)
            .await
            .unwrap();

        assert!(second.success);
        assert_eq!(provider.call_count(), 2, "no new provider calls expected");
        assert_eq!(second.unchanged_count(), 2);
    }

    #[tokio::test]
    async fn test_changed_node_is_updated_in_place() {
        let mut graph = build_graph(QUEUE_ALARM);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::default());
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>);

        let queue_id = NodeId::new("app", "queue");
        let mut prior = PriorState::new();
        prior.insert(
            queue_id.clone(),
            PriorResource {
                remote_id: String::from("r-existing"),
                spec_hash: String::from("stale-hash"),
                outputs: BTreeMap::new(),
            },
        );

        let report = executor.execute(&plan, &mut graph, &prior).await.unwrap();

        assert!(report.success);
        let queue = report.nodes.iter().find(|n| n.id == queue_id).unwrap();
        assert!(!queue.reused);
        assert_eq!(queue.remote_id.as_deref(), Some("r-existing"));
    }

    #[tokio::test]
    async fn test_producer_update_reprovisions_consumer() {
        let mut graph = build_graph(QUEUE_ALARM);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::default());
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>);

        // The queue declaration changed; the alarm's did not, and its
        // prior record still points at the queue's old arn.
        let hasher = GraphHasher;
        let queue_id = NodeId::new("app", "queue");
        let alarm_id = NodeId::new("app", "alarm");
        let mut prior = PriorState::new();
        prior.insert(
            queue_id.clone(),
            PriorResource {
                remote_id: String::from("r-queue"),
                spec_hash: String::from("stale-hash"),
                outputs: BTreeMap::from([
                    (String::from("arn"), serde_json::json!("old:app/queue:arn")),
                    (String::from("url"), serde_json::json!("old:app/queue:url")),
                ]),
            },
        );
        prior.insert(
            alarm_id.clone(),
            PriorResource {
                remote_id: String::from("r-alarm"),
                spec_hash: hasher.hash_node(graph.node(&alarm_id).unwrap()),
                outputs: BTreeMap::from([(
                    String::from("arn"),
                    serde_json::json!("old:app/alarm:arn"),
                )]),
            },
        );

        let report = executor.execute(&plan, &mut graph, &prior).await.unwrap();

        assert!(report.success);
        // both the changed queue and its consumer hit the provider
        assert_eq!(provider.call_count(), 2);
        let alarm = report.nodes.iter().find(|n| n.id == alarm_id).unwrap();
        assert!(!alarm.reused);
        assert_eq!(alarm.remote_id.as_deref(), Some("r-alarm"));

        let requests = provider.requests();
        let alarm_request = requests.iter().find(|r| r.id == alarm_id).unwrap();
        assert_eq!(
            alarm_request.properties["metric_source"],
            serde_json::json!("out:app/queue:arn")
        );
    }

    #[tokio::test]
    async fn test_missing_output_fails_consumer_only() {
        let mut graph = build_graph(DIAMOND);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::omitting("app/repository", "uri"));
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>)
            .with_failure_policy(FailurePolicy::Continue);

        let report = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();

        assert!(!report.success);
        let repository = graph.node(&NodeId::new("app", "repository")).unwrap();
        assert_eq!(repository.state, NodeState::Provisioned);

        let service = report
            .nodes
            .iter()
            .find(|n| n.id.name() == "service")
            .unwrap();
        assert_eq!(service.state, NodeState::Failed);
        assert!(service.reason.as_deref().unwrap().contains("no output 'uri'"));

        let alarm = graph.node(&NodeId::new("app", "alarm")).unwrap();
        assert_eq!(alarm.state, NodeState::Skipped);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everything() {
        let mut graph = build_graph(QUEUE_ALARM);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(ScriptedProvider::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>)
            .with_cancel_token(cancel);

        let report = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.success, "cancellation is not a failure");
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(provider.call_count(), 0);

        // downstream nodes carry the cancellation reason, not a
        // dependency-failure message
        let alarm = report.nodes.iter().find(|n| n.id.name() == "alarm").unwrap();
        assert_eq!(alarm.reason.as_deref(), Some("run cancelled"));
    }

    #[tokio::test]
    async fn test_cancel_mid_layer_lets_in_flight_call_finish() {
        let mut graph = build_graph(QUEUE_ALARM);
        let plan = ProvisioningPlan::from_graph(&graph);
        let provider = Arc::new(GatedProvider::new());
        let cancel = CancelToken::new();
        let executor = PlanExecutor::new(Arc::clone(&provider) as Arc<dyn ResourceProvider>)
            .with_cancel_token(cancel.clone());

        let run = tokio::spawn(async move {
            let report = executor
                .execute(&plan, &mut graph, &PriorState::new())
                .await
                .unwrap();
            (report, graph)
        });

        // wait until the queue's provider call is in flight, then cancel
        while !provider.entered() {
            tokio::task::yield_now().await;
        }
        cancel.cancel();
        provider.release();

        let (report, graph) = run.await.unwrap();
        assert!(report.cancelled);
        assert!(report.success, "a finished in-flight call is not a failure");

        let queue = graph.node(&NodeId::new("app", "queue")).unwrap();
        assert_eq!(queue.state, NodeState::Provisioned);
        assert_eq!(
            queue.outputs.get("arn"),
            Some(&serde_json::json!("out:app/queue:arn"))
        );

        let alarm = report.nodes.iter().find(|n| n.id.name() == "alarm").unwrap();
        assert_eq!(alarm.state, NodeState::Skipped);
        assert_eq!(alarm.reason.as_deref(), Some("run cancelled"));
    }

    #[tokio::test]
    async fn test_simulated_provider_end_to_end() {
        let mut graph = build_graph(DIAMOND);
        let plan = ProvisioningPlan::from_graph(&graph);
        let executor = PlanExecutor::new(Arc::new(SimulatedProvider::new())).with_parallelism(2);

        let report = executor
            .execute(&plan, &mut graph, &PriorState::new())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.provisioned_count(), 4);
        for node in graph.nodes() {
            assert_eq!(node.state, NodeState::Provisioned);
            assert_eq!(node.outputs.len(), node.output_contract.len());
        }
    }
}
