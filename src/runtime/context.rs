//! Per-run state: status machine, result store, cancellation.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::node::NodeOutputs;

/// Terminal and in-flight states of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Error | RunStatus::Cancelled
        )
    }
}

/// Per-node execution state within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Running,
    Done,
    Failed,
    Skipped,
}

/// The first surfaced failure of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub node_id: Option<String>,
    pub message: String,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock ceiling for a single run.
    pub max_execution_time_secs: u64,
    /// Capacity of the run event channel.
    pub event_buffer: usize,
    /// Upper bound applied to ForEach parallelism when `max_workers` is
    /// omitted.
    pub foreach_worker_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_execution_time_secs: 600,
            event_buffer: 256,
            foreach_worker_cap: 64,
        }
    }
}

/// State of one run of a graph. One executor drives one `RunContext`;
/// ForEach iterations get child contexts chained to the parent's cancel
/// signal.
pub struct RunContext {
    run_id: String,
    status: RwLock<RunStatus>,
    node_states: RwLock<HashMap<String, NodeState>>,
    results: RwLock<HashMap<String, NodeOutputs>>,
    error: RwLock<Option<RunError>>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    fn with_token(cancel: CancellationToken) -> Self {
        RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            status: RwLock::new(RunStatus::Pending),
            node_states: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            error: RwLock::new(None),
            cancel,
        }
    }

    /// Child context with its own id whose cancel signal trips when the
    /// parent's does.
    pub fn child(&self) -> Self {
        Self::with_token(self.cancel.child_token())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> RunStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: RunStatus) {
        *self.status.write() = status;
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Trip the cancel signal. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.node_states.read().get(node_id).copied()
    }

    pub fn node_states(&self) -> HashMap<String, NodeState> {
        self.node_states.read().clone()
    }

    pub fn set_node_state(&self, node_id: &str, state: NodeState) {
        self.node_states
            .write()
            .insert(node_id.to_string(), state);
    }

    /// Write a node's outputs. Single writer per key: a second write for
    /// the same node id within one run is a bug and is ignored.
    pub fn store_result(&self, node_id: &str, outputs: NodeOutputs) {
        let mut results = self.results.write();
        if results.contains_key(node_id) {
            tracing::warn!(node_id, "duplicate result write ignored");
            return;
        }
        results.insert(node_id.to_string(), outputs);
    }

    pub fn result_of(&self, node_id: &str) -> Option<NodeOutputs> {
        self.results.read().get(node_id).cloned()
    }

    pub fn results_snapshot(&self) -> HashMap<String, NodeOutputs> {
        self.results.read().clone()
    }

    /// Record the run's error. The first surfaced failure wins; later ones
    /// are dropped.
    pub fn record_error(&self, node_id: Option<String>, message: impl Into<String>) {
        let mut slot = self.error.write();
        if slot.is_none() {
            *slot = Some(RunError {
                node_id,
                message: message.into(),
            });
        }
    }

    pub fn error(&self) -> Option<RunError> {
        self.error.read().clone()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_machine() {
        let run = RunContext::new();
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(!run.status().is_terminal());
        run.set_status(RunStatus::Running);
        run.set_status(RunStatus::Completed);
        assert!(run.status().is_terminal());
    }

    #[test]
    fn test_result_store_single_writer() {
        let run = RunContext::new();
        run.store_result("a", HashMap::from([("x".to_string(), json!(1))]));
        run.store_result("a", HashMap::from([("x".to_string(), json!(2))]));
        assert_eq!(run.result_of("a").unwrap()["x"], json!(1));
    }

    #[test]
    fn test_first_error_wins() {
        let run = RunContext::new();
        run.record_error(Some("n1".into()), "boom");
        run.record_error(Some("n2".into()), "later");
        let err = run.error().unwrap();
        assert_eq!(err.node_id.as_deref(), Some("n1"));
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let parent = RunContext::new();
        let child = parent.child();
        let grandchild = child.child();
        assert_ne!(parent.run_id(), child.run_id());
        parent.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent() {
        let parent = RunContext::new();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_cancel_idempotent() {
        let run = RunContext::new();
        run.cancel();
        run.cancel();
        assert!(run.is_cancelled());
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_execution_time_secs, 600);
        assert_eq!(config.foreach_worker_cap, 64);
    }
}
