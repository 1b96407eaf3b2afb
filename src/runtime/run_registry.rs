//! Process-wide run registry: spawn, poll and cancel workflow runs.
//!
//! Owned by the service layer and handed around as an `Arc`; the engine
//! itself never reaches for globals.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use super::context::{EngineConfig, RunContext, RunStatus};
use super::events::EventEmitter;
use super::executor::Executor;
use crate::error::{WorkflowError, WorkflowResult};
use crate::graph::{build_graph, WorkflowSchema};
use crate::node::{NodeOutputs, NodeRegistry, ProcessContext};

/// Externally visible task status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Error,
    Cancelled,
    NotFound,
}

/// Status payload returned for a task id. Partial results are included in
/// every state so failed runs can be inspected.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: TaskStatus,
    pub result: HashMap<String, NodeOutputs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    fn not_found() -> Self {
        StatusReport {
            status: TaskStatus::NotFound,
            result: HashMap::new(),
            error: None,
        }
    }
}

struct RunHandle {
    run: Arc<RunContext>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Registry of active and finished workflow runs.
pub struct RunRegistry {
    node_registry: Arc<NodeRegistry>,
    config: EngineConfig,
    runs: DashMap<String, Arc<RunHandle>>,
}

impl RunRegistry {
    pub fn new(node_registry: Arc<NodeRegistry>, config: EngineConfig) -> Self {
        RunRegistry {
            node_registry,
            config,
            runs: DashMap::new(),
        }
    }

    /// Build, validate and start a workflow. Returns the task id used for
    /// status polling and cancellation. Build and validation failures are
    /// reported synchronously.
    pub fn execute(&self, schema: &WorkflowSchema) -> WorkflowResult<String> {
        self.execute_with_events(schema, EventEmitter::disabled())
    }

    pub fn execute_with_events(
        &self,
        schema: &WorkflowSchema,
        events: EventEmitter,
    ) -> WorkflowResult<String> {
        let graph = build_graph(schema, &self.node_registry)?;

        let run = Arc::new(RunContext::new());
        let task_id = run.run_id().to_string();
        let ctx = ProcessContext::new(
            run.clone(),
            self.node_registry.clone(),
            events,
            self.config.clone(),
        );

        info!(task_id = %task_id, nodes = graph.node_count(), "starting workflow run");
        let executor = Executor::new(graph, ctx);
        let task = tokio::spawn(async move {
            // Terminal state and errors land on the RunContext.
            let _ = executor.run().await;
        });

        self.runs.insert(
            task_id.clone(),
            Arc::new(RunHandle {
                run,
                task: Mutex::new(Some(task)),
            }),
        );
        Ok(task_id)
    }

    /// Status and (partial) results for a task.
    pub fn status(&self, task_id: &str) -> StatusReport {
        let Some(handle) = self.runs.get(task_id) else {
            return StatusReport::not_found();
        };

        let status = match handle.run.status() {
            RunStatus::Pending | RunStatus::Running => TaskStatus::Running,
            RunStatus::Completed => TaskStatus::Completed,
            RunStatus::Error => TaskStatus::Error,
            RunStatus::Cancelled => TaskStatus::Cancelled,
        };
        StatusReport {
            status,
            result: handle.run.results_snapshot(),
            error: handle.run.error().map(|e| e.message),
        }
    }

    /// Cancel a running task: trip its cancel signal and wait for the run
    /// to drain. Idempotent; returns `TaskNotFound` for unknown ids.
    pub async fn cancel(&self, task_id: &str) -> WorkflowResult<StatusReport> {
        let handle = match self.runs.get(task_id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Err(WorkflowError::TaskNotFound(task_id.to_string())),
        };

        handle.run.cancel();
        let task = handle.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        info!(task_id = %task_id, "workflow run cancelled");
        Ok(self.status(task_id))
    }

    /// Drop a finished task's state. Running tasks are left untouched.
    pub fn remove_finished(&self, task_id: &str) -> bool {
        if let Some(handle) = self.runs.get(task_id) {
            if !handle.run.status().is_terminal() {
                return false;
            }
        } else {
            return false;
        }
        self.runs.remove(task_id).is_some()
    }
}
