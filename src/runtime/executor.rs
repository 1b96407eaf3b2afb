//! The scheduler: topological, level-parallel graph execution.
//!
//! One executor drives one [`RunContext`]. All ready nodes (in-degree
//! zero against completed predecessors) are dispatched concurrently onto a
//! `JoinSet`; a node becomes ready the instant its last predecessor's
//! outputs are stored. The scheduling loop never blocks on a single node,
//! so it stays responsive to completions and cancellation while any
//! `process()` is suspended.

use chrono::Utc;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::context::{NodeState, RunStatus};
use super::events::RunEvent;
use super::resolver::resolve_effective_inputs;
use crate::error::{NodeError, WorkflowError, WorkflowResult};
use crate::graph::Graph;
use crate::node::{NodeOutputs, ProcessContext};

pub struct Executor {
    graph: Graph,
    ctx: ProcessContext,
}

impl Executor {
    pub fn new(graph: Graph, ctx: ProcessContext) -> Self {
        Executor { graph, ctx }
    }

    /// Run the graph to a terminal state. The executor is consumed: one
    /// run context is driven by exactly one executor.
    ///
    /// Returns the full result store on success. On failure or
    /// cancellation the terminal state, partial results and first error
    /// remain inspectable on the [`RunContext`].
    pub async fn run(self) -> WorkflowResult<std::collections::HashMap<String, NodeOutputs>> {
        let Executor { graph, ctx } = self;
        if !graph.is_validated() {
            return Err(WorkflowError::GraphValidationError(
                "graph must be validated before execution".to_string(),
            ));
        }

        let run = ctx.run.clone();
        let run_id = run.run_id().to_string();
        run.set_status(RunStatus::Running);
        for id in graph.node_ids() {
            run.set_node_state(id, NodeState::Pending);
        }

        let started = Instant::now();
        let deadline = Duration::from_secs(ctx.config.max_execution_time_secs);

        let mut in_degree = graph.in_degrees().clone();
        let mut ready: VecDeque<String> = {
            let mut sources: Vec<String> = in_degree
                .iter()
                .filter(|(_, d)| **d == 0)
                .map(|(id, _)| id.clone())
                .collect();
            sources.sort();
            sources.into()
        };

        let mut in_flight: JoinSet<(String, Result<NodeOutputs, NodeError>)> = JoinSet::new();
        let mut first_error: Option<WorkflowError> = None;
        let mut timed_out = false;

        loop {
            // Dispatch everything currently ready, unless the run has been
            // stopped by a failure, a timeout or the cancel signal.
            while first_error.is_none() && !timed_out && !run.is_cancelled() {
                let Some(node_id) = ready.pop_front() else { break };
                let graph_node = graph.node(&node_id)?;

                match resolve_effective_inputs(&graph, graph_node, &run.results_snapshot()) {
                    Ok(inputs) => {
                        run.set_node_state(&node_id, NodeState::Running);
                        debug!(run_id = %run_id, node_id = %node_id, node_type = %graph_node.node_type, "dispatching node");
                        ctx.events
                            .emit(RunEvent::NodeStarted {
                                run_id: run_id.clone(),
                                node_id: node_id.clone(),
                                timestamp: Utc::now(),
                            })
                            .await;

                        let node = graph_node.node.clone();
                        let task_ctx = ctx.clone();
                        let id = node_id.clone();
                        in_flight.spawn(async move {
                            let outputs = node.process(&task_ctx, inputs).await;
                            (id, outputs)
                        });
                    }
                    Err(e) => {
                        // Unschedulable node: fails at the moment of dispatch.
                        error!(run_id = %run_id, node_id = %node_id, error = %e, "port resolution failed");
                        run.set_node_state(&node_id, NodeState::Failed);
                        run.record_error(Some(node_id.clone()), e.to_string());
                        ctx.events
                            .emit(RunEvent::NodeFailed {
                                run_id: run_id.clone(),
                                node_id: node_id.clone(),
                                error: e.to_string(),
                                timestamp: Utc::now(),
                            })
                            .await;
                        first_error = Some(WorkflowError::node(node_id, e));
                        run.cancel();
                    }
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(WorkflowError::InternalError(format!(
                            "node task aborted: {}",
                            join_err
                        )));
                        run.cancel();
                    }
                }
                Ok((node_id, Ok(outputs))) => {
                    if first_error.is_some() || run.is_cancelled() {
                        // Completed after the run stopped: outputs discarded.
                        run.set_node_state(&node_id, NodeState::Skipped);
                    } else {
                        run.store_result(&node_id, outputs);
                        run.set_node_state(&node_id, NodeState::Done);
                        ctx.events
                            .emit(RunEvent::NodeFinished {
                                run_id: run_id.clone(),
                                node_id: node_id.clone(),
                                timestamp: Utc::now(),
                            })
                            .await;
                        for successor in graph.successors_of(&node_id) {
                            let degree = in_degree
                                .get_mut(successor)
                                .expect("successors are graph nodes");
                            *degree -= 1;
                            if *degree == 0 {
                                ready.push_back(successor.clone());
                            }
                        }
                    }
                }
                Ok((node_id, Err(e))) => {
                    run.set_node_state(&node_id, NodeState::Failed);
                    ctx.events
                        .emit(RunEvent::NodeFailed {
                            run_id: run_id.clone(),
                            node_id: node_id.clone(),
                            error: e.to_string(),
                            timestamp: Utc::now(),
                        })
                        .await;
                    // A failure during drain (after a cancel or an earlier
                    // failure) is recorded but does not become the run error.
                    if first_error.is_none() && !run.is_cancelled() {
                        error!(run_id = %run_id, node_id = %node_id, error = %e, "node failed");
                        run.record_error(Some(node_id.clone()), e.to_string());
                        first_error = Some(WorkflowError::node(node_id, e));
                        run.cancel();
                    } else {
                        warn!(run_id = %run_id, node_id = %node_id, error = %e, "node failed during drain");
                    }
                }
            }

            if !timed_out && first_error.is_none() && started.elapsed() > deadline {
                warn!(run_id = %run_id, "run exceeded execution time limit");
                timed_out = true;
                run.cancel();
            }
        }

        if let Some(e) = first_error {
            mark_remaining_skipped(&run, &graph);
            run.set_status(RunStatus::Error);
            ctx.events
                .emit(RunEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: e.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
            return Err(e);
        }

        if timed_out {
            mark_remaining_skipped(&run, &graph);
            run.record_error(None, WorkflowError::Timeout.to_string());
            run.set_status(RunStatus::Error);
            ctx.events
                .emit(RunEvent::RunFailed {
                    run_id: run_id.clone(),
                    error: WorkflowError::Timeout.to_string(),
                    timestamp: Utc::now(),
                })
                .await;
            return Err(WorkflowError::Timeout);
        }

        if run.is_cancelled() {
            mark_remaining_skipped(&run, &graph);
            run.set_status(RunStatus::Cancelled);
            ctx.events
                .emit(RunEvent::RunCancelled {
                    run_id: run_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;
            return Err(WorkflowError::Cancelled);
        }

        run.set_status(RunStatus::Completed);
        ctx.events
            .emit(RunEvent::RunCompleted {
                run_id,
                timestamp: Utc::now(),
            })
            .await;
        Ok(run.results_snapshot())
    }
}

fn mark_remaining_skipped(run: &super::context::RunContext, graph: &Graph) {
    for id in graph.node_ids() {
        if run.node_state(id) == Some(NodeState::Pending) {
            run.set_node_state(id, NodeState::Skipped);
        }
    }
}
