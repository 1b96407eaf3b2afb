//! Graph validation: cycle detection and the sub-workflow report for UIs.

use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::builder::build_graph;
use super::schema::WorkflowSchema;
use super::types::Graph;
use crate::error::{WorkflowError, WorkflowResult};
use crate::node::NodeRegistry;

/// Reject graphs with a directed cycle, naming one involved node.
pub(crate) fn detect_cycle(graph: &Graph) -> WorkflowResult<()> {
    let mut digraph = StableDiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();
    for id in graph.node_ids() {
        indices.insert(id.as_str(), digraph.add_node(id.as_str()));
    }
    let mut seen = HashSet::new();
    for conn in graph.connections() {
        if seen.insert((conn.from_node.as_str(), conn.to_node.as_str())) {
            digraph.add_edge(indices[conn.from_node.as_str()], indices[conn.to_node.as_str()], ());
        }
    }

    match petgraph::algo::toposort(&digraph, None) {
        Ok(_) => Ok(()),
        Err(cycle) => {
            let node = digraph
                .node_weight(cycle.node_id())
                .copied()
                .unwrap_or_default();
            Err(WorkflowError::CycleDetected(node.to_string()))
        }
    }
}

/// Outcome of a sub-workflow validation request.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn new() -> Self {
        ValidationReport {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.valid = false;
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Request payload for validating a ForEach sub-workflow ahead of execution.
#[derive(Debug, Clone, Deserialize)]
pub struct SubWorkflowRequest {
    #[serde(flatten)]
    pub workflow: WorkflowSchema,
    pub result_node_id: String,
    #[serde(default = "default_result_port")]
    pub result_port_name: String,
}

fn default_result_port() -> String {
    "result".to_string()
}

/// Validate a sub-workflow description for UI feedback. Collects every
/// problem instead of stopping at the first one.
pub fn validate_sub_workflow(
    registry: &NodeRegistry,
    request: &SubWorkflowRequest,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let schema = &request.workflow;

    let mut has_foreach_item = false;
    for (id, node_schema) in &schema.nodes {
        if !registry.contains(&node_schema.node_type) {
            report.error(format!(
                "Unknown node type '{}' for node '{}'",
                node_schema.node_type, id
            ));
        } else if node_schema.node_type == "ForEachItem" {
            has_foreach_item = true;
        }
    }
    if !has_foreach_item {
        report.error("Sub-workflow has no ForEachItem node to receive the current item");
    }

    match schema.nodes.get(&request.result_node_id) {
        None => {
            report.error(format!(
                "Result node '{}' not found in sub-workflow",
                request.result_node_id
            ));
        }
        Some(node_schema) => {
            if let Ok(node) = registry.create(&node_schema.node_type, &node_schema.inputs) {
                if !node.output_ports().contains_key(&request.result_port_name) {
                    report.error(format!(
                        "Result port '{}' is not declared by node '{}'",
                        request.result_port_name, request.result_node_id
                    ));
                }
            }
        }
    }

    // Structural checks (dangling connections, duplicate targets, bad port
    // types, cycles) come from the graph build itself.
    if report.errors.is_empty() {
        match build_graph(schema, registry) {
            Ok(graph) => {
                if graph.node_count() > 1 {
                    let mut connected: HashSet<&str> = HashSet::new();
                    for conn in graph.connections() {
                        connected.insert(conn.from_node.as_str());
                        connected.insert(conn.to_node.as_str());
                    }
                    for id in graph.node_ids() {
                        if !connected.contains(id.as_str()) {
                            report.warning(format!("Node '{}' is not connected to anything", id));
                        }
                    }
                }
            }
            Err(e) => report.error(e.to_string()),
        }
    }

    report
}
