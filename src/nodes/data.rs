//! Numeric, JSON and list leaf nodes, plus the Delay utility node.

use async_trait::async_trait;
use serde_json::{json, Number, Value};
use std::time::Duration;

use super::control::lookup_path;
use crate::error::NodeError;
use crate::node::{port_map, NodeInputs, NodeOutputs, PortMap, ProcessContext, WorkflowNode};
use crate::port::{PortDescriptor, PortType};

fn single_output(name: &str, value: Value) -> NodeOutputs {
    NodeOutputs::from([(name.to_string(), value)])
}

/// Validates that the input is numeric and passes it through.
pub struct NumberInputNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl NumberInputNode {
    pub fn new() -> Self {
        NumberInputNode {
            input_ports: port_map(vec![PortDescriptor::new("value", PortType::Number, true)]),
            output_ports: port_map(vec![PortDescriptor::new("value", PortType::Number, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for NumberInputNode {
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
        Ok(single_output("value", inputs.require("value")?.clone()))
    }
}

/// Binary arithmetic over two numbers. Integer arithmetic is preserved
/// when both operands are integers and the operation is exact.
pub struct MathOperationNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl MathOperationNode {
    pub fn new() -> Self {
        MathOperationNode {
            input_ports: port_map(vec![
                PortDescriptor::new("a", PortType::Number, true),
                PortDescriptor::new("b", PortType::Number, true),
                PortDescriptor::new("operation", PortType::String, false)
                    .with_default(json!("add"))
                    .with_options(vec![
                        json!("add"),
                        json!("subtract"),
                        json!("multiply"),
                        json!("divide"),
                    ]),
            ]),
            output_ports: port_map(vec![PortDescriptor::new("result", PortType::Number, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for MathOperationNode {
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
        let a = inputs.require("a")?;
        let b = inputs.require("b")?;
        let operation = inputs.str_or("operation", "add");

        if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
            let exact = match operation {
                "add" => x.checked_add(y),
                "subtract" => x.checked_sub(y),
                "multiply" => x.checked_mul(y),
                "divide" if y != 0 && x % y == 0 => Some(x / y),
                _ => None,
            };
            if let Some(result) = exact {
                return Ok(single_output("result", json!(result)));
            }
        }

        let x = a
            .as_f64()
            .ok_or_else(|| NodeError::invalid_value("a", "expected a number"))?;
        let y = b
            .as_f64()
            .ok_or_else(|| NodeError::invalid_value("b", "expected a number"))?;
        let result = match operation {
            "add" => x + y,
            "subtract" => x - y,
            "multiply" => x * y,
            "divide" => {
                if y == 0.0 {
                    return Err(NodeError::ExecutionError("division by zero".to_string()));
                }
                x / y
            }
            other => {
                return Err(NodeError::invalid_value(
                    "operation",
                    format!("unsupported operation '{}'", other),
                ))
            }
        };
        let number = Number::from_f64(result)
            .ok_or_else(|| NodeError::ExecutionError("non-finite result".to_string()))?;
        Ok(single_output("result", Value::Number(number)))
    }
}

/// Parses a JSON string, tolerating fenced ``` blocks around it.
pub struct JsonParseNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl JsonParseNode {
    pub fn new() -> Self {
        JsonParseNode {
            input_ports: port_map(vec![PortDescriptor::new(
                "json_string",
                PortType::String,
                true,
            )]),
            output_ports: port_map(vec![PortDescriptor::new(
                "json_object",
                PortType::Json,
                true,
            )]),
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(newline) = rest.find('\n') {
            let body = &rest[newline + 1..];
            return body.trim().strip_suffix("```").unwrap_or(body).trim();
        }
    }
    trimmed
}

#[async_trait]
impl WorkflowNode for JsonParseNode {
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
        let text = strip_code_fence(inputs.str("json_string")?);
        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| NodeError::invalid_value("json_string", format!("invalid JSON: {}", e)))?;
        Ok(single_output("json_object", parsed))
    }
}

/// Extracts a value from a JSON object by dotted path.
pub struct JsonExtractNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl JsonExtractNode {
    pub fn new() -> Self {
        JsonExtractNode {
            input_ports: port_map(vec![
                PortDescriptor::new("json_object", PortType::Json, true),
                PortDescriptor::new("key", PortType::String, true),
            ]),
            output_ports: port_map(vec![
                PortDescriptor::new("value", PortType::Any, true),
                PortDescriptor::new("found", PortType::Boolean, true),
            ]),
        }
    }
}

#[async_trait]
impl WorkflowNode for JsonExtractNode {
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
        let data = inputs.require("json_object")?;
        let key = inputs.str("key")?;
        let value = lookup_path(data, key);
        let mut outputs = NodeOutputs::new();
        outputs.insert("found".to_string(), json!(value.is_some()));
        outputs.insert("value".to_string(), value.unwrap_or(Value::Null));
        Ok(outputs)
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        let adjusted = len as i64 + index;
        if adjusted < 0 {
            None
        } else {
            Some(adjusted as usize)
        }
    } else {
        Some(index as usize)
    }
}

/// Extracts a sub-range of a list; negative indices count from the end.
pub struct ListRangeNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl ListRangeNode {
    pub fn new() -> Self {
        ListRangeNode {
            input_ports: port_map(vec![
                PortDescriptor::new("list", PortType::Array, true),
                PortDescriptor::new("start", PortType::Number, false).with_default(json!(0)),
                PortDescriptor::new("end", PortType::Number, false),
            ]),
            output_ports: port_map(vec![
                PortDescriptor::new("result", PortType::Array, true),
                PortDescriptor::new("length", PortType::Number, true),
            ]),
        }
    }
}

#[async_trait]
impl WorkflowNode for ListRangeNode {
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
        let len = list.len();
        let start = inputs
            .opt_f64("start")
            .map(|v| v as i64)
            .and_then(|i| resolve_index(i, len))
            .unwrap_or(0)
            .min(len);
        let end = inputs
            .opt_f64("end")
            .map(|v| v as i64)
            .and_then(|i| resolve_index(i, len))
            .unwrap_or(len)
            .min(len);

        let result: Vec<Value> = if start < end {
            list[start..end].to_vec()
        } else {
            Vec::new()
        };
        let mut outputs = NodeOutputs::new();
        outputs.insert("length".to_string(), json!(result.len()));
        outputs.insert("result".to_string(), Value::Array(result));
        Ok(outputs)
    }
}

/// Looks up a single element; negative indices count from the end.
pub struct ListIndexNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl ListIndexNode {
    pub fn new() -> Self {
        ListIndexNode {
            input_ports: port_map(vec![
                PortDescriptor::new("list", PortType::Array, true),
                PortDescriptor::new("index", PortType::Number, false).with_default(json!(0)),
            ]),
            output_ports: port_map(vec![
                PortDescriptor::new("value", PortType::Any, true),
                PortDescriptor::new("exists", PortType::Boolean, true),
            ]),
        }
    }
}

#[async_trait]
impl WorkflowNode for ListIndexNode {
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
        let index = inputs.opt_f64("index").unwrap_or(0.0) as i64;
        let value = resolve_index(index, list.len()).and_then(|i| list.get(i)).cloned();

        let mut outputs = NodeOutputs::new();
        outputs.insert("exists".to_string(), json!(value.is_some()));
        outputs.insert("value".to_string(), value.unwrap_or(Value::Null));
        Ok(outputs)
    }
}

pub struct ListLengthNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl ListLengthNode {
    pub fn new() -> Self {
        ListLengthNode {
            input_ports: port_map(vec![PortDescriptor::new("list", PortType::Array, true)]),
            output_ports: port_map(vec![PortDescriptor::new("length", PortType::Number, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for ListLengthNode {
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
        Ok(single_output("length", json!(inputs.array("list")?.len())))
    }
}

/// Sleeps for `delay_ms`, then forwards `data`. The sleep is a suspension
/// point: a cancel observed mid-sleep aborts the node.
pub struct DelayNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl DelayNode {
    pub fn new() -> Self {
        DelayNode {
            input_ports: port_map(vec![
                PortDescriptor::new("delay_ms", PortType::Number, false).with_default(json!(100)),
                PortDescriptor::new("data", PortType::Any, false),
            ]),
            output_ports: port_map(vec![PortDescriptor::new("output", PortType::Any, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for DelayNode {
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
        let delay = Duration::from_millis(inputs.opt_f64("delay_ms").unwrap_or(100.0) as u64);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = ctx.cancel_token().cancelled() => return Err(NodeError::Cancelled),
        }
        Ok(single_output(
            "output",
            inputs.get("data").cloned().unwrap_or(Value::Null),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeRegistry;
    use crate::runtime::{EngineConfig, EventEmitter, RunContext};
    use std::sync::Arc;

    fn ctx() -> ProcessContext {
        ProcessContext::new(
            Arc::new(RunContext::new()),
            Arc::new(NodeRegistry::new()),
            EventEmitter::disabled(),
            EngineConfig::default(),
        )
    }

    fn node_inputs(pairs: &[(&str, Value)]) -> NodeInputs {
        NodeInputs::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_math_integer_preserved() {
        let node = MathOperationNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(&[("a", json!(3)), ("b", json!(2)), ("operation", json!("multiply"))]),
            )
            .await
            .unwrap();
        assert_eq!(out["result"], json!(6));

        let out = node
            .process(&ctx(), node_inputs(&[("a", json!(9)), ("b", json!(10))]))
            .await
            .unwrap();
        assert_eq!(out["result"], json!(19));
    }

    #[tokio::test]
    async fn test_math_float_division() {
        let node = MathOperationNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(&[("a", json!(7)), ("b", json!(2)), ("operation", json!("divide"))]),
            )
            .await
            .unwrap();
        assert_eq!(out["result"], json!(3.5));

        let out = node
            .process(
                &ctx(),
                node_inputs(&[("a", json!(8)), ("b", json!(2)), ("operation", json!("divide"))]),
            )
            .await
            .unwrap();
        assert_eq!(out["result"], json!(4));
    }

    #[tokio::test]
    async fn test_math_division_by_zero() {
        let node = MathOperationNode::new();
        let err = node
            .process(
                &ctx(),
                node_inputs(&[("a", json!(1)), ("b", json!(0)), ("operation", json!("divide"))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::ExecutionError(_)));
    }

    #[tokio::test]
    async fn test_json_parse_plain_and_fenced() {
        let node = JsonParseNode::new();
        let out = node
            .process(&ctx(), node_inputs(&[("json_string", json!("{\"a\": 1}"))]))
            .await
            .unwrap();
        assert_eq!(out["json_object"], json!({"a": 1}));

        let fenced = "```json\n{\"a\": 2}\n```";
        let out = node
            .process(&ctx(), node_inputs(&[("json_string", json!(fenced))]))
            .await
            .unwrap();
        assert_eq!(out["json_object"], json!({"a": 2}));

        let err = node
            .process(&ctx(), node_inputs(&[("json_string", json!("nope"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_json_extract() {
        let node = JsonExtractNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(&[
                    ("json_object", json!({"a": {"b": [10, 20]}})),
                    ("key", json!("a.b.1")),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(out["value"], json!(20));
        assert_eq!(out["found"], json!(true));

        let out = node
            .process(
                &ctx(),
                node_inputs(&[("json_object", json!({"a": 1})), ("key", json!("missing"))]),
            )
            .await
            .unwrap();
        assert_eq!(out["value"], Value::Null);
        assert_eq!(out["found"], json!(false));
    }

    #[tokio::test]
    async fn test_list_range_negative_indices() {
        let node = ListRangeNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(&[("list", json!([1, 2, 3, 4, 5])), ("start", json!(-3)), ("end", json!(-1))]),
            )
            .await
            .unwrap();
        assert_eq!(out["result"], json!([3, 4]));
        assert_eq!(out["length"], json!(2));
    }

    #[tokio::test]
    async fn test_list_range_defaults() {
        let node = ListRangeNode::new();
        let out = node
            .process(&ctx(), node_inputs(&[("list", json!([1, 2]))]))
            .await
            .unwrap();
        assert_eq!(out["result"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_list_index() {
        let node = ListIndexNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(&[("list", json!(["a", "b", "c"])), ("index", json!(-1))]),
            )
            .await
            .unwrap();
        assert_eq!(out["value"], json!("c"));
        assert_eq!(out["exists"], json!(true));

        let out = node
            .process(
                &ctx(),
                node_inputs(&[("list", json!(["a"])), ("index", json!(9))]),
            )
            .await
            .unwrap();
        assert_eq!(out["exists"], json!(false));
    }

    #[tokio::test]
    async fn test_delay_cancel() {
        let node = DelayNode::new();
        let context = ctx();
        context.run.cancel();
        let err = node
            .process(
                &context,
                node_inputs(&[("delay_ms", json!(5000)), ("data", json!(1))]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Cancelled));
    }

    #[tokio::test]
    async fn test_delay_passes_data() {
        let node = DelayNode::new();
        let out = node
            .process(
                &ctx(),
                node_inputs(&[("delay_ms", json!(1)), ("data", json!("payload"))]),
            )
            .await
            .unwrap();
        assert_eq!(out["output"], json!("payload"));
    }
}
