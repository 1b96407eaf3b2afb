#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portflow::error::NodeError;
use portflow::node::{
    port_map, NodeInputs, NodeOutputs, NodeRegistry, PortMap, ProcessContext, WorkflowNode,
};
use portflow::port::{PortDescriptor, PortType};
use portflow::runtime::{EngineConfig, EventEmitter, RunContext, RunEvent};
use portflow::{build_graph, Executor, WorkflowSchema};

/// Test node that tracks how many instances are inside `process()` at
/// once, holding for a fixed duration so overlaps are observable.
pub struct GaugeNode {
    input_ports: PortMap,
    output_ports: PortMap,
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    hold: Duration,
}

#[async_trait]
impl WorkflowNode for GaugeNode {
    fn input_ports(&self) -> &PortMap {
        &self.input_ports
    }

    fn output_ports(&self) -> &PortMap {
        &self.output_ports
    }

    async fn process(
        &self,
        _ctx: &ProcessContext,
        inputs: NodeInputs,
    ) -> Result<NodeOutputs, NodeError> {
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(NodeOutputs::from([(
            "output".to_string(),
            inputs.get("data").cloned().unwrap_or(Value::Null),
        )]))
    }
}

/// Register a `Gauge` node type; all instances share one counter. Returns
/// the high-water mark of simultaneously running instances.
pub fn register_gauge(registry: &mut NodeRegistry, hold_ms: u64) -> Arc<AtomicUsize> {
    let current = Arc::new(AtomicUsize::new(0));
    let max = Arc::new(AtomicUsize::new(0));
    let max_handle = max.clone();
    registry.register("Gauge", "test", move |_| {
        Arc::new(GaugeNode {
            input_ports: port_map(vec![PortDescriptor::new("data", PortType::Any, false)]),
            output_ports: port_map(vec![PortDescriptor::new("output", PortType::Any, true)]),
            current: current.clone(),
            max: max.clone(),
            hold: Duration::from_millis(hold_ms),
        })
    });
    max_handle
}

pub fn schema(value: Value) -> WorkflowSchema {
    serde_json::from_value(value).expect("workflow json parses")
}

/// Run a workflow against the given registry, collecting emitted events.
pub async fn run_workflow_with(
    registry: Arc<NodeRegistry>,
    workflow: Value,
) -> (
    Result<std::collections::HashMap<String, NodeOutputs>, portflow::WorkflowError>,
    Arc<RunContext>,
    Vec<RunEvent>,
) {
    let graph = build_graph(&schema(workflow), &registry).expect("workflow builds");
    let run = Arc::new(RunContext::new());
    let config = EngineConfig::default();
    let (emitter, mut rx) = EventEmitter::channel(config.event_buffer);
    let ctx = ProcessContext::new(run.clone(), registry, emitter, config);
    let result = Executor::new(graph, ctx).run().await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (result, run, events)
}

pub async fn run_workflow(
    workflow: Value,
) -> (
    Result<std::collections::HashMap<String, NodeOutputs>, portflow::WorkflowError>,
    Arc<RunContext>,
    Vec<RunEvent>,
) {
    run_workflow_with(Arc::new(NodeRegistry::new()), workflow).await
}

/// Sub-workflow that multiplies the injected item by two.
pub fn double_sub_workflow() -> Value {
    json!({
        "nodes": {
            "item": {"type": "ForEachItem"},
            "double": {"type": "MathOperation", "inputs": {"b": 2, "operation": "multiply"}}
        },
        "connections": [
            {"from_node": "item", "from_port": "item", "to_node": "double", "to_port": "a"}
        ]
    })
}
