//! The ForEach fan-out engine.
//!
//! A regular node from the scheduler's point of view: its `process()`
//! materializes one fresh sub-graph per item and runs it through the same
//! executor under a child run context. The node itself always succeeds and
//! reports partial work through its output ports; per-iteration failures
//! land in `errors`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::NodeError;
use crate::graph::{Connection, Graph, WorkflowSchema};
use crate::node::{
    port_map, NodeInputs, NodeOutputs, NodeRegistry, PortMap, ProcessContext, WorkflowNode,
};
use crate::port::{PortDescriptor, PortType};
use crate::runtime::Executor;

pub struct ForEachNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl ForEachNode {
    pub fn new() -> Self {
        ForEachNode {
            input_ports: port_map(vec![
                PortDescriptor::new("items", PortType::Array, true),
                PortDescriptor::new("sub_workflow", PortType::Object, true),
                PortDescriptor::new("result_node_id", PortType::String, true),
                PortDescriptor::new("result_port_name", PortType::String, false)
                    .with_default(json!("result")),
                PortDescriptor::new("parallel", PortType::Boolean, false)
                    .with_default(json!(false)),
                PortDescriptor::new("continue_on_error", PortType::Boolean, false)
                    .with_default(json!(true)),
                PortDescriptor::new("max_iterations", PortType::Number, false),
                PortDescriptor::new("max_workers", PortType::Number, false),
                PortDescriptor::new("global_vars", PortType::Object, false),
            ]),
            output_ports: port_map(vec![
                PortDescriptor::new("results", PortType::Array, true),
                PortDescriptor::new("sub_workflow_results", PortType::Array, true),
                PortDescriptor::new("item_value", PortType::Any, true),
                PortDescriptor::new("current_index", PortType::Number, true),
                PortDescriptor::new("total_count", PortType::Number, true),
                PortDescriptor::new("success_count", PortType::Number, true),
                PortDescriptor::new("error_count", PortType::Number, true),
                PortDescriptor::new("errors", PortType::Array, true),
            ]),
        }
    }
}

struct IterationSuccess {
    collected: Value,
    store: HashMap<String, NodeOutputs>,
}

struct IterationFailure {
    error: String,
    partial: HashMap<String, NodeOutputs>,
}

struct IterationOutcome {
    index: usize,
    item: Value,
    result: Result<IterationSuccess, IterationFailure>,
}

/// Build a fresh sub-graph instance for one iteration. Every node that
/// declares the injection ports receives the current item, index and
/// globals as input-value overrides.
fn materialize(
    schema: &WorkflowSchema,
    registry: &NodeRegistry,
    item: &Value,
    index: usize,
    globals: &Value,
) -> Result<Graph, NodeError> {
    let mut graph = Graph::new();
    for (id, node_schema) in &schema.nodes {
        let node = registry
            .create(&node_schema.node_type, &node_schema.inputs)
            .map_err(|e| NodeError::InvalidSubWorkflow(e.to_string()))?;

        let mut input_values: HashMap<String, Value> = node_schema
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let ports = node.input_ports();
        if ports.contains_key("foreach_item") {
            input_values.insert("foreach_item".to_string(), item.clone());
        }
        if ports.contains_key("foreach_index") {
            input_values.insert("foreach_index".to_string(), json!(index));
        }
        if ports.contains_key("foreach_global_vars") {
            input_values.insert("foreach_global_vars".to_string(), globals.clone());
        }

        graph
            .add_node(id.clone(), node_schema.node_type.clone(), node, input_values)
            .map_err(|e| NodeError::InvalidSubWorkflow(e.to_string()))?;
    }
    for conn in &schema.connections {
        graph
            .add_connection(Connection::new(
                &conn.from_node,
                &conn.from_port,
                &conn.to_node,
                &conn.to_port,
            ))
            .map_err(|e| NodeError::InvalidSubWorkflow(e.to_string()))?;
    }
    graph
        .validate()
        .map_err(|e| NodeError::InvalidSubWorkflow(e.to_string()))?;
    Ok(graph)
}

async fn run_iteration(
    ctx: &ProcessContext,
    schema: &WorkflowSchema,
    item: Value,
    index: usize,
    globals: &Value,
    result_node_id: &str,
    result_port_name: &str,
) -> IterationOutcome {
    let graph = match materialize(schema, &ctx.registry, &item, index, globals) {
        Ok(graph) => graph,
        Err(e) => {
            return IterationOutcome {
                index,
                item,
                result: Err(IterationFailure {
                    error: e.to_string(),
                    partial: HashMap::new(),
                }),
            }
        }
    };

    let child_ctx = ctx.child();
    let child_run = child_ctx.run.clone();
    let result = match Executor::new(graph, child_ctx).run().await {
        Ok(store) => match store
            .get(result_node_id)
            .and_then(|outputs| outputs.get(result_port_name))
        {
            Some(value) => Ok(IterationSuccess {
                collected: value.clone(),
                store,
            }),
            None => Err(IterationFailure {
                error: format!(
                    "Result port '{}' not found in outputs of node '{}'",
                    result_port_name, result_node_id
                ),
                partial: store,
            }),
        },
        Err(e) => Err(IterationFailure {
            error: e.to_string(),
            partial: child_run.results_snapshot(),
        }),
    };

    IterationOutcome {
        index,
        item,
        result,
    }
}

#[async_trait]
impl WorkflowNode for ForEachNode {
    fn input_ports(&self) -> &PortMap {
        &self.input_ports
    }

    fn output_ports(&self) -> &PortMap {
        &self.output_ports
    }

    async fn process(
        &self,
        ctx: &ProcessContext,
        inputs: NodeInputs,
    ) -> Result<NodeOutputs, NodeError> {
        let items = inputs
            .require("items")?
            .as_array()
            .cloned()
            .ok_or_else(|| NodeError::InvalidForEachItems("non-array value".to_string()))?;

        let schema = WorkflowSchema::from_value(inputs.require("sub_workflow")?)
            .map_err(|e| NodeError::InvalidSubWorkflow(e.to_string()))?;
        let result_node_id = inputs.str("result_node_id")?.to_string();
        let result_port_name = inputs.str_or("result_port_name", "result").to_string();
        let parallel = inputs.bool_or("parallel", false);
        let continue_on_error = inputs.bool_or("continue_on_error", true);
        let max_iterations = inputs.opt_usize("max_iterations");
        let max_workers = inputs.opt_usize("max_workers");
        let globals = inputs
            .get("global_vars")
            .cloned()
            .unwrap_or_else(|| json!({}));

        // Validate the plan once; iterations re-use the checked description.
        let plan = materialize(&schema, &ctx.registry, &Value::Null, 0, &globals)?;
        let result_node = plan.node(&result_node_id).map_err(|_| {
            NodeError::InvalidSubWorkflow(format!(
                "Result node '{}' not found in sub-workflow",
                result_node_id
            ))
        })?;
        if !result_node
            .node
            .output_ports()
            .contains_key(&result_port_name)
        {
            return Err(NodeError::InvalidSubWorkflow(format!(
                "Result port '{}' is not declared by node '{}'",
                result_port_name, result_node_id
            )));
        }
        drop(plan);

        let effective: Vec<Value> = match max_iterations {
            Some(max) if max < items.len() => items[..max].to_vec(),
            _ => items,
        };
        let total = effective.len();

        info!(
            total,
            parallel, continue_on_error, "ForEach starting iteration"
        );

        let mut slots: Vec<Option<IterationOutcome>> = Vec::new();
        slots.resize_with(total, || None);

        if parallel {
            let workers = max_workers
                .filter(|w| *w > 0)
                .unwrap_or_else(|| total.min(ctx.config.foreach_worker_cap))
                .max(1);
            let semaphore = Arc::new(Semaphore::new(workers));
            let abort = CancellationToken::new();
            let schema = Arc::new(schema);
            let result_node_id = Arc::new(result_node_id);
            let result_port_name = Arc::new(result_port_name);
            let globals = Arc::new(globals);
            let mut tasks = Vec::with_capacity(total);

            for (index, item) in effective.iter().cloned().enumerate() {
                if abort.is_cancelled() || ctx.is_cancelled() {
                    break;
                }
                // Acquiring before spawning pins the start order to
                // ascending index; completion order stays arbitrary.
                let permit = semaphore.clone().acquire_owned().await.unwrap();
                let ctx = ctx.clone();
                let schema = schema.clone();
                let result_node_id = result_node_id.clone();
                let result_port_name = result_port_name.clone();
                let globals = globals.clone();
                let abort = abort.clone();

                tasks.push(tokio::spawn(async move {
                    if abort.is_cancelled() || ctx.is_cancelled() {
                        drop(permit);
                        return None;
                    }
                    let outcome = run_iteration(
                        &ctx,
                        &schema,
                        item,
                        index,
                        &globals,
                        &result_node_id,
                        &result_port_name,
                    )
                    .await;
                    if outcome.result.is_err() && !continue_on_error {
                        abort.cancel();
                    }
                    drop(permit);
                    Some(outcome)
                }));
            }

            for task in tasks {
                match task.await {
                    Ok(Some(outcome)) => {
                        let index = outcome.index;
                        slots[index] = Some(outcome);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "ForEach iteration task aborted");
                    }
                }
            }
        } else {
            for (index, item) in effective.iter().cloned().enumerate() {
                if ctx.is_cancelled() {
                    break;
                }
                let outcome = run_iteration(
                    ctx,
                    &schema,
                    item,
                    index,
                    &globals,
                    &result_node_id,
                    &result_port_name,
                )
                .await;
                let failed = outcome.result.is_err();
                slots[index] = Some(outcome);
                if failed && !continue_on_error {
                    warn!(index, "ForEach stopped at failed iteration");
                    break;
                }
            }
        }

        let mut results = Vec::new();
        let mut sub_workflow_results = Vec::new();
        let mut errors = Vec::new();
        let mut success_count = 0u64;
        let mut error_count = 0u64;

        for outcome in slots.into_iter().flatten() {
            match outcome.result {
                Ok(success) => {
                    results.push(success.collected);
                    sub_workflow_results.push(json!({
                        "index": outcome.index,
                        "results": serde_json::to_value(&success.store).unwrap_or(Value::Null),
                    }));
                    success_count += 1;
                }
                Err(failure) => {
                    errors.push(json!({
                        "index": outcome.index,
                        "item": outcome.item,
                        "error": failure.error,
                        "partial_results": serde_json::to_value(&failure.partial).unwrap_or(Value::Null),
                    }));
                    error_count += 1;
                }
            }
        }

        info!(success_count, error_count, "ForEach completed");

        let mut outputs = NodeOutputs::new();
        outputs.insert("results".to_string(), Value::Array(results));
        outputs.insert(
            "sub_workflow_results".to_string(),
            Value::Array(sub_workflow_results),
        );
        outputs.insert(
            "item_value".to_string(),
            effective.last().cloned().unwrap_or(Value::Null),
        );
        outputs.insert(
            "current_index".to_string(),
            json!(total as i64 - 1),
        );
        outputs.insert("total_count".to_string(), json!(total));
        outputs.insert("success_count".to_string(), json!(success_count));
        outputs.insert("error_count".to_string(), json!(error_count));
        outputs.insert("errors".to_string(), Value::Array(errors));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{EngineConfig, EventEmitter, RunContext};

    fn ctx() -> ProcessContext {
        ProcessContext::new(
            Arc::new(RunContext::new()),
            Arc::new(NodeRegistry::new()),
            EventEmitter::disabled(),
            EngineConfig::default(),
        )
    }

    fn strip_sub_workflow() -> Value {
        json!({
            "nodes": {
                "item": {"type": "ForEachItem"},
                "strip": {"type": "TextStrip"}
            },
            "connections": [
                {"from_node": "item", "from_port": "item", "to_node": "strip", "to_port": "text"}
            ]
        })
    }

    fn node_inputs(pairs: Vec<(&str, Value)>) -> NodeInputs {
        NodeInputs::new(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[tokio::test]
    async fn test_sequential_iteration() {
        let node = ForEachNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!([" a", " b ", "c "])),
                    ("sub_workflow", strip_sub_workflow()),
                    ("result_node_id", json!("strip")),
                    ("result_port_name", json!("text")),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(out["results"], json!(["a", "b", "c"]));
        assert_eq!(out["success_count"], json!(3));
        assert_eq!(out["error_count"], json!(0));
        assert_eq!(out["total_count"], json!(3));
        assert_eq!(out["current_index"], json!(2));
        assert_eq!(out["item_value"], json!("c "));
    }

    #[tokio::test]
    async fn test_sub_workflow_results_carry_index() {
        let node = ForEachNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!([" x"])),
                    ("sub_workflow", strip_sub_workflow()),
                    ("result_node_id", json!("strip")),
                    ("result_port_name", json!("text")),
                ]),
            )
            .await
            .unwrap();

        let entries = out["sub_workflow_results"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["index"], json!(0));
        assert_eq!(entries[0]["results"]["strip"]["text"], json!("x"));
        assert_eq!(entries[0]["results"]["item"]["index"], json!(0));
    }

    #[tokio::test]
    async fn test_max_iterations_truncates() {
        let node = ForEachNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!(["a", "b", "c", "d"])),
                    ("sub_workflow", strip_sub_workflow()),
                    ("result_node_id", json!("strip")),
                    ("result_port_name", json!("text")),
                    ("max_iterations", json!(2)),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out["results"], json!(["a", "b"]));
        assert_eq!(out["total_count"], json!(2));
    }

    #[tokio::test]
    async fn test_missing_result_node_fails_before_iterating() {
        let node = ForEachNode::new();
        let err = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!(["a"])),
                    ("sub_workflow", strip_sub_workflow()),
                    ("result_node_id", json!("ghost")),
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidSubWorkflow(_)));
    }

    #[tokio::test]
    async fn test_undeclared_result_port_fails() {
        let node = ForEachNode::new();
        let err = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!(["a"])),
                    ("sub_workflow", strip_sub_workflow()),
                    ("result_node_id", json!("strip")),
                    ("result_port_name", json!("bogus")),
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidSubWorkflow(_)));
    }

    #[tokio::test]
    async fn test_globals_injection() {
        let node = ForEachNode::new();
        let sub = json!({
            "nodes": {
                "item": {"type": "ForEachItem"}
            },
            "connections": []
        });
        let out = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!([1])),
                    ("sub_workflow", sub),
                    ("result_node_id", json!("item")),
                    ("result_port_name", json!("global_vars")),
                    ("global_vars", json!({"run": "alpha"})),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out["results"], json!([{"run": "alpha"}]));
    }

    #[tokio::test]
    async fn test_empty_items() {
        let node = ForEachNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(vec![
                    ("items", json!([])),
                    ("sub_workflow", strip_sub_workflow()),
                    ("result_node_id", json!("strip")),
                    ("result_port_name", json!("text")),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out["results"], json!([]));
        assert_eq!(out["total_count"], json!(0));
        assert_eq!(out["current_index"], json!(-1));
        assert_eq!(out["item_value"], Value::Null);
    }
}
