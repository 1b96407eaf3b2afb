//! Serde schema for workflow JSON.
//!
//! The same shape is used for top-level workflows and for the
//! `sub_workflow` value embedded in a ForEach node input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One workflow description: nodes keyed by id plus a connection list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSchema {
    #[serde(default)]
    pub nodes: HashMap<String, NodeSchema>,
    #[serde(default)]
    pub connections: Vec<ConnectionSchema>,
}

/// Node entry: type name plus static input values. Saved files in the wild
/// use both `inputs` and `input_values` for the same field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSchema {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, alias = "input_values")]
    pub inputs: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSchema {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

impl WorkflowSchema {
    /// Parse a workflow description out of an arbitrary JSON value.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_with_inputs_alias() {
        let schema: WorkflowSchema = serde_json::from_value(json!({
            "nodes": {
                "a": {"type": "TextInput", "inputs": {"text": "hi"}},
                "b": {"type": "TextStrip", "input_values": {}}
            },
            "connections": [
                {"from_node": "a", "from_port": "text", "to_node": "b", "to_port": "text"}
            ]
        }))
        .unwrap();

        assert_eq!(schema.nodes.len(), 2);
        assert_eq!(schema.nodes["a"].inputs["text"], json!("hi"));
        assert_eq!(schema.connections[0].to_port, "text");
    }

    #[test]
    fn test_parse_empty_sections() {
        let schema: WorkflowSchema = serde_json::from_value(json!({})).unwrap();
        assert!(schema.nodes.is_empty());
        assert!(schema.connections.is_empty());
    }

    #[test]
    fn test_roundtrip() {
        let schema: WorkflowSchema = serde_json::from_value(json!({
            "nodes": {"a": {"type": "TextInput", "inputs": {"text": "x"}}},
            "connections": []
        }))
        .unwrap();
        let value = serde_json::to_value(&schema).unwrap();
        let back = WorkflowSchema::from_value(&value).unwrap();
        assert_eq!(back.nodes["a"].node_type, "TextInput");
    }
}
