//! Port resolution: compute a node's effective inputs from the result
//! store, its static input values and its port defaults.
//!
//! Pure with respect to the run: a failure here is the node's failure, not
//! a scheduler bug. Precedence per input port: inbound connection value →
//! static `input_values` entry → declared default → absent (optional
//! ports) → missing-required error.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::NodeError;
use crate::graph::{Graph, GraphNode};
use crate::node::{NodeInputs, NodeOutputs};
use crate::port::coerce_value;

pub fn resolve_effective_inputs(
    graph: &Graph,
    node: &GraphNode,
    results: &HashMap<String, NodeOutputs>,
) -> Result<NodeInputs, NodeError> {
    let mut values: HashMap<String, Value> = HashMap::new();

    for (name, port) in node.node.input_ports() {
        let mut supplied: Option<Value> = None;

        if let Some((from_node, from_port)) = graph.source_for(&node.id, name) {
            // The upstream node may have completed without emitting this
            // port (Switch branches, gated PassThrough); the connection
            // then supplies nothing and the constant/default applies.
            if let Some(outputs) = results.get(from_node) {
                supplied = outputs.get(from_port).cloned();
            }
        }

        if supplied.is_none() {
            supplied = node.input_values.get(name).cloned();
        }

        match supplied {
            Some(value) => {
                values.insert(name.clone(), coerce_value(port, value)?);
            }
            None => {
                if let Some(default) = &port.default_value {
                    values.insert(name.clone(), default.clone());
                } else if port.required {
                    return Err(NodeError::missing_input(name));
                }
            }
        }
    }

    Ok(NodeInputs::new(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, WorkflowSchema};
    use crate::node::NodeRegistry;
    use serde_json::json;

    fn graph(value: serde_json::Value) -> Graph {
        let schema: WorkflowSchema = serde_json::from_value(value).unwrap();
        build_graph(&schema, &NodeRegistry::new()).unwrap()
    }

    #[test]
    fn test_connection_overrides_constant() {
        let g = graph(json!({
            "nodes": {
                "a": {"type": "TextInput", "inputs": {"text": "upstream"}},
                "b": {"type": "TextStrip", "inputs": {"text": "constant"}}
            },
            "connections": [
                {"from_node": "a", "from_port": "text", "to_node": "b", "to_port": "text"}
            ]
        }));

        let results = HashMap::from([(
            "a".to_string(),
            HashMap::from([("text".to_string(), json!("upstream"))]),
        )]);
        let inputs = resolve_effective_inputs(&g, g.node("b").unwrap(), &results).unwrap();
        assert_eq!(inputs.str("text").unwrap(), "upstream");
    }

    #[test]
    fn test_constant_when_upstream_port_absent() {
        let g = graph(json!({
            "nodes": {
                "a": {"type": "PassThrough", "inputs": {"data": "gated"}},
                "b": {"type": "TextStrip", "inputs": {"text": "constant"}}
            },
            "connections": [
                {"from_node": "a", "from_port": "output", "to_node": "b", "to_port": "text"}
            ]
        }));

        // Upstream completed but emitted nothing on `output`.
        let results = HashMap::from([("a".to_string(), NodeOutputs::new())]);
        let inputs = resolve_effective_inputs(&g, g.node("b").unwrap(), &results).unwrap();
        assert_eq!(inputs.str("text").unwrap(), "constant");
    }

    #[test]
    fn test_default_applies() {
        let g = graph(json!({
            "nodes": {
                "list": {"type": "TextToList", "inputs": {"text": "x"}}
            },
            "connections": []
        }));
        let inputs =
            resolve_effective_inputs(&g, g.node("list").unwrap(), &HashMap::new()).unwrap();
        // format defaults to "repeat"
        assert_eq!(inputs.str_or("format", ""), "repeat");
    }

    #[test]
    fn test_optional_without_default_is_absent() {
        let g = graph(json!({
            "nodes": {
                "pt": {"type": "PassThrough", "inputs": {"data": 1}}
            },
            "connections": []
        }));
        let inputs = resolve_effective_inputs(&g, g.node("pt").unwrap(), &HashMap::new()).unwrap();
        assert!(!inputs.contains("control"));
    }

    #[test]
    fn test_missing_required() {
        let g = graph(json!({
            "nodes": {"strip": {"type": "TextStrip"}},
            "connections": []
        }));
        let err =
            resolve_effective_inputs(&g, g.node("strip").unwrap(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, NodeError::MissingRequiredInput { .. }));
    }

    #[test]
    fn test_coercion_error_surfaces() {
        let g = graph(json!({
            "nodes": {
                "fe": {"type": "ForEach", "inputs": {
                    "items": [],
                    "sub_workflow": "{not json",
                    "result_node_id": "x"
                }}
            },
            "connections": []
        }));
        let err = resolve_effective_inputs(&g, g.node("fe").unwrap(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, NodeError::TypeCoercionError { .. }));
    }

    #[test]
    fn test_type_mismatch_on_constant() {
        let g = graph(json!({
            "nodes": {
                "strip": {"type": "TextStrip", "inputs": {"text": 42}}
            },
            "connections": []
        }));
        let err =
            resolve_effective_inputs(&g, g.node("strip").unwrap(), &HashMap::new()).unwrap_err();
        assert!(matches!(err, NodeError::TypeMismatch { .. }));
    }
}
