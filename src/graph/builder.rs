//! Materialize an executable [`Graph`] from a workflow description.

use super::schema::WorkflowSchema;
use super::types::{Connection, Graph};
use crate::error::WorkflowResult;
use crate::node::NodeRegistry;

/// Build and validate a graph: create every node through the registry, wire
/// the connections, then run the acyclicity check and index computation.
pub fn build_graph(schema: &WorkflowSchema, registry: &NodeRegistry) -> WorkflowResult<Graph> {
    let mut graph = Graph::new();

    for (id, node_schema) in &schema.nodes {
        let node = registry.create(&node_schema.node_type, &node_schema.inputs)?;
        let input_values = node_schema
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        graph.add_node(id.clone(), node_schema.node_type.clone(), node, input_values)?;
    }

    for conn in &schema.connections {
        graph.add_connection(Connection::new(
            &conn.from_node,
            &conn.from_port,
            &conn.to_node,
            &conn.to_port,
        ))?;
    }

    graph.validate()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use serde_json::json;

    fn schema(value: serde_json::Value) -> WorkflowSchema {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_build_linear_graph() {
        let registry = NodeRegistry::new();
        let graph = build_graph(
            &schema(json!({
                "nodes": {
                    "in": {"type": "TextInput", "inputs": {"text": " hi "}},
                    "strip": {"type": "TextStrip"}
                },
                "connections": [
                    {"from_node": "in", "from_port": "text", "to_node": "strip", "to_port": "text"}
                ]
            })),
            &registry,
        )
        .unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.in_degrees()["strip"], 1);
        assert_eq!(graph.in_degrees()["in"], 0);
        assert_eq!(graph.successors_of("in"), ["strip"]);
        assert_eq!(
            graph.source_for("strip", "text"),
            Some(&("in".to_string(), "text".to_string()))
        );
        assert_eq!(graph.source_nodes(), vec!["in"]);
        assert_eq!(graph.sink_nodes(), vec!["strip"]);
    }

    #[test]
    fn test_duplicate_node_id() {
        let registry = NodeRegistry::new();
        let mut graph = crate::graph::Graph::new();
        let first = registry.create("TextStrip", &serde_json::Map::new()).unwrap();
        let second = registry.create("TextStrip", &serde_json::Map::new()).unwrap();

        graph
            .add_node("strip", "TextStrip", first, Default::default())
            .unwrap();
        let err = graph
            .add_node("strip", "TextStrip", second, Default::default())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::GraphBuildError(_)));
        assert!(err.to_string().contains("Duplicate node id"));
    }

    #[test]
    fn test_unknown_node_type() {
        let registry = NodeRegistry::new();
        let err = build_graph(
            &schema(json!({"nodes": {"x": {"type": "Nope"}}, "connections": []})),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownNodeType(_)));
    }

    #[test]
    fn test_dangling_connection() {
        let registry = NodeRegistry::new();
        let err = build_graph(
            &schema(json!({
                "nodes": {"in": {"type": "TextInput", "inputs": {"text": "x"}}},
                "connections": [
                    {"from_node": "in", "from_port": "text", "to_node": "gone", "to_port": "text"}
                ]
            })),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::GraphValidationError(_)));
    }

    #[test]
    fn test_duplicate_target_port() {
        let registry = NodeRegistry::new();
        let err = build_graph(
            &schema(json!({
                "nodes": {
                    "a": {"type": "TextInput", "inputs": {"text": "x"}},
                    "b": {"type": "TextInput", "inputs": {"text": "y"}},
                    "strip": {"type": "TextStrip"}
                },
                "connections": [
                    {"from_node": "a", "from_port": "text", "to_node": "strip", "to_port": "text"},
                    {"from_node": "b", "from_port": "text", "to_node": "strip", "to_port": "text"}
                ]
            })),
            &registry,
        )
        .unwrap_err();
        assert!(err.to_string().contains("already has an inbound connection"));
    }

    #[test]
    fn test_incompatible_port_types() {
        let registry = NodeRegistry::new();
        // TextStrip.text is a string output; ListLength.list wants an array.
        let err = build_graph(
            &schema(json!({
                "nodes": {
                    "strip": {"type": "TextStrip", "inputs": {"text": "x"}},
                    "len": {"type": "ListLength"}
                },
                "connections": [
                    {"from_node": "strip", "from_port": "text", "to_node": "len", "to_port": "list"}
                ]
            })),
            &registry,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Incompatible port types"));
    }

    #[test]
    fn test_cycle_rejected() {
        let registry = NodeRegistry::new();
        let err = build_graph(
            &schema(json!({
                "nodes": {
                    "a": {"type": "TextStrip"},
                    "b": {"type": "TextStrip"}
                },
                "connections": [
                    {"from_node": "a", "from_port": "text", "to_node": "b", "to_port": "text"},
                    {"from_node": "b", "from_port": "text", "to_node": "a", "to_port": "text"}
                ]
            })),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)));
    }

    #[test]
    fn test_duplicate_connection_deduplicated() {
        let registry = NodeRegistry::new();
        let graph = build_graph(
            &schema(json!({
                "nodes": {
                    "in": {"type": "TextInput", "inputs": {"text": "x"}},
                    "strip": {"type": "TextStrip"}
                },
                "connections": [
                    {"from_node": "in", "from_port": "text", "to_node": "strip", "to_port": "text"},
                    {"from_node": "in", "from_port": "text", "to_node": "strip", "to_port": "text"}
                ]
            })),
            &registry,
        )
        .unwrap();
        assert_eq!(graph.connections().len(), 1);
    }
}
