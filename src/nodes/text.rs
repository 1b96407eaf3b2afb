//! Text leaf nodes.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::NodeError;
use crate::node::{port_map, NodeInputs, NodeOutputs, PortMap, ProcessContext, WorkflowNode};
use crate::port::{PortDescriptor, PortType};

fn single_output(name: &str, value: Value) -> NodeOutputs {
    NodeOutputs::from([(name.to_string(), value)])
}

/// Passes text through unchanged; a marker/entry node for workflows.
pub struct TextInputNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl TextInputNode {
    pub fn new() -> Self {
        TextInputNode {
            input_ports: port_map(vec![PortDescriptor::new("text", PortType::String, true)]),
            output_ports: port_map(vec![PortDescriptor::new("text", PortType::String, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for TextInputNode {
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
        Ok(single_output("text", json!(inputs.str("text")?)))
    }
}

/// Trims leading and trailing whitespace.
pub struct TextStripNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl TextStripNode {
    pub fn new() -> Self {
        TextStripNode {
            input_ports: port_map(vec![PortDescriptor::new("text", PortType::String, true)]),
            output_ports: port_map(vec![PortDescriptor::new("text", PortType::String, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for TextStripNode {
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
        Ok(single_output("text", json!(inputs.str("text")?.trim())))
    }
}

/// Turns a string into a list, either by repetition or by splitting on a
/// delimiter (pieces are trimmed, empty pieces dropped).
pub struct TextToListNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl TextToListNode {
    pub fn new() -> Self {
        TextToListNode {
            input_ports: port_map(vec![
                PortDescriptor::new("text", PortType::String, true),
                PortDescriptor::new("format", PortType::String, false)
                    .with_default(json!("repeat"))
                    .with_options(vec![json!("repeat"), json!("delimited")]),
                PortDescriptor::new("repeat_count", PortType::Number, false).with_default(json!(1)),
                PortDescriptor::new("delimiter", PortType::String, false).with_default(json!(",")),
            ]),
            output_ports: port_map(vec![PortDescriptor::new("list", PortType::Array, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for TextToListNode {
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
        let text = inputs.str("text")?;
        let list: Vec<Value> = match inputs.str_or("format", "repeat") {
            "delimited" => {
                let delimiter = inputs.str_or("delimiter", ",");
                text.split(delimiter)
                    .map(str::trim)
                    .filter(|piece| !piece.is_empty())
                    .map(|piece| json!(piece))
                    .collect()
            }
            _ => {
                let count = inputs.opt_usize("repeat_count").unwrap_or(1);
                if count < 1 {
                    return Err(NodeError::invalid_value(
                        "repeat_count",
                        "must be a positive integer",
                    ));
                }
                std::iter::repeat(json!(text)).take(count).collect()
            }
        };
        Ok(single_output("list", Value::Array(list)))
    }
}

/// Takes the first element of a list as text.
pub struct ListToTextNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl ListToTextNode {
    pub fn new() -> Self {
        ListToTextNode {
            input_ports: port_map(vec![PortDescriptor::new("list", PortType::Array, true)]),
            output_ports: port_map(vec![PortDescriptor::new("text", PortType::String, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for ListToTextNode {
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
        let list = inputs.array("list")?;
        let first = list
            .first()
            .ok_or_else(|| NodeError::invalid_value("list", "input list is empty"))?;
        let text = match first {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Ok(single_output("text", json!(text)))
    }
}

/// Joins two texts with a separator.
pub struct TextConcatNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl TextConcatNode {
    pub fn new() -> Self {
        TextConcatNode {
            input_ports: port_map(vec![
                PortDescriptor::new("text1", PortType::String, true),
                PortDescriptor::new("text2", PortType::String, true),
                PortDescriptor::new("separator", PortType::String, false).with_default(json!(" ")),
            ]),
            output_ports: port_map(vec![PortDescriptor::new("result", PortType::String, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for TextConcatNode {
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
        let result = format!(
            "{}{}{}",
            inputs.str("text1")?,
            inputs.str_or("separator", " "),
            inputs.str("text2")?
        );
        Ok(single_output("result", json!(result)))
    }
}

/// Substitutes `{name}` placeholders from a vars object into a template.
pub struct TextTemplateNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl TextTemplateNode {
    pub fn new() -> Self {
        TextTemplateNode {
            input_ports: port_map(vec![
                PortDescriptor::new("template", PortType::String, true),
                PortDescriptor::new("vars", PortType::Object, false).with_default(json!({})),
            ]),
            output_ports: port_map(vec![PortDescriptor::new("text", PortType::String, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for TextTemplateNode {
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
        let mut text = inputs.str("template")?.to_string();
        if let Some(Value::Object(vars)) = inputs.get("vars") {
            for (key, value) in vars {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                text = text.replace(&format!("{{{}}}", key), &rendered);
            }
        }
        Ok(single_output("text", json!(text)))
    }
}
