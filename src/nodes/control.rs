//! Control nodes: ForEachItem, Switch, Merge, PassThrough.
//!
//! Their semantics are part of the execution model: Switch routes by
//! emitting on a subset of its output ports, Merge and PassThrough gate on
//! the engine-wide emptiness predicate, and ForEachItem is the entry point
//! the ForEach engine injects the current item into.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::NodeError;
use crate::node::{port_map, NodeInputs, NodeOutputs, PortMap, ProcessContext, WorkflowNode};
use crate::port::{is_empty_value, PortDescriptor, PortType};

/// Walk a dotted field path into a value; integer segments index arrays.
pub(crate) fn lookup_path(data: &Value, path: &str) -> Option<Value> {
    let mut current = data.clone();
    for segment in path.split('.') {
        current = match &current {
            Value::Object(map) => map.get(segment)?.clone(),
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?.clone()
            }
            _ => return None,
        };
    }
    Some(current)
}

// ================================
// ForEachItem
// ================================

/// Entry node of a ForEach sub-workflow. All inputs are optional; the
/// ForEach engine overwrites them per iteration. Pure pass-through.
pub struct ForEachItemNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl ForEachItemNode {
    pub fn new() -> Self {
        ForEachItemNode {
            input_ports: port_map(vec![
                PortDescriptor::new("foreach_item", PortType::Any, false),
                PortDescriptor::new("foreach_index", PortType::Number, false),
                PortDescriptor::new("foreach_global_vars", PortType::Object, false),
            ]),
            output_ports: port_map(vec![
                PortDescriptor::new("item", PortType::Any, true),
                PortDescriptor::new("index", PortType::Number, true),
                PortDescriptor::new("global_vars", PortType::Object, true),
            ]),
        }
    }
}

#[async_trait]
impl WorkflowNode for ForEachItemNode {
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
        let mut outputs = NodeOutputs::new();
        outputs.insert(
            "item".to_string(),
            inputs.get("foreach_item").cloned().unwrap_or(Value::Null),
        );
        outputs.insert(
            "index".to_string(),
            inputs.get("foreach_index").cloned().unwrap_or(json!(0)),
        );
        outputs.insert(
            "global_vars".to_string(),
            inputs
                .get("foreach_global_vars")
                .cloned()
                .unwrap_or_else(|| json!({})),
        );
        Ok(outputs)
    }
}

// ================================
// Switch
// ================================

struct SwitchRule {
    field: String,
    operator: String,
    value: Value,
    output_index: usize,
}

/// Routes its input to one or more of `output_0 … output_{n-1}` by rule
/// matching, or to `fallback` when nothing matches. Non-selected outputs
/// stay absent.
pub struct SwitchNode {
    input_ports: PortMap,
    output_ports: PortMap,
    output_count: usize,
}

impl SwitchNode {
    pub fn new(output_count: usize) -> Self {
        let output_count = output_count.max(1);
        let mut outputs: Vec<PortDescriptor> = (0..output_count)
            .map(|i| PortDescriptor::new(format!("output_{}", i), PortType::Any, true))
            .collect();
        outputs.push(PortDescriptor::new("fallback", PortType::Any, true));

        SwitchNode {
            input_ports: port_map(vec![
                PortDescriptor::new("data", PortType::Any, true),
                PortDescriptor::new("rules", PortType::Array, false).with_default(json!([])),
                PortDescriptor::new("mode", PortType::String, false)
                    .with_default(json!("first_match"))
                    .with_options(vec![json!("first_match"), json!("all_matches")]),
            ]),
            output_ports: port_map(outputs),
            output_count,
        }
    }

    pub fn from_config(config: &Map<String, Value>) -> Self {
        let output_count = config
            .get("output_count")
            .and_then(Value::as_u64)
            .unwrap_or(2) as usize;
        Self::new(output_count)
    }

    fn parse_rules(&self, rules_value: &[Value]) -> Vec<SwitchRule> {
        rules_value
            .iter()
            .enumerate()
            .filter_map(|(i, rule)| {
                let rule = rule.as_object()?;
                Some(SwitchRule {
                    field: rule
                        .get("field")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    operator: rule
                        .get("operator")
                        .and_then(Value::as_str)
                        .unwrap_or("equals")
                        .to_string(),
                    value: rule.get("value").cloned().unwrap_or(Value::Null),
                    output_index: rule
                        .get("output_index")
                        .and_then(Value::as_u64)
                        .map(|v| v as usize)
                        .unwrap_or(i % self.output_count),
                })
            })
            .collect()
    }

    fn evaluate_rule(&self, data: &Value, rule: &SwitchRule) -> bool {
        let field_value = lookup_path(data, &rule.field).unwrap_or(Value::Null);
        match rule.operator.as_str() {
            "equals" => loose_eq(&field_value, &rule.value),
            "not_equals" => !loose_eq(&field_value, &rule.value),
            "greater" => numeric_cmp(&field_value, &rule.value, |o| o == std::cmp::Ordering::Greater),
            "greater_equal" => {
                numeric_cmp(&field_value, &rule.value, |o| o != std::cmp::Ordering::Less)
            }
            "less" => numeric_cmp(&field_value, &rule.value, |o| o == std::cmp::Ordering::Less),
            "less_equal" => {
                numeric_cmp(&field_value, &rule.value, |o| o != std::cmp::Ordering::Greater)
            }
            "contains" => text_of(&field_value).contains(&text_of(&rule.value)),
            "not_contains" => !text_of(&field_value).contains(&text_of(&rule.value)),
            "starts_with" => text_of(&field_value).starts_with(&text_of(&rule.value)),
            "ends_with" => text_of(&field_value).ends_with(&text_of(&rule.value)),
            "regex" => Regex::new(&text_of(&rule.value))
                .map(|re| re.is_match(&text_of(&field_value)))
                .unwrap_or(false),
            "is_empty" => is_empty_value(&field_value),
            "is_not_empty" => !is_empty_value(&field_value),
            other => {
                debug!(operator = other, "unsupported switch operator");
                false
            }
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn numeric_cmp(a: &Value, b: &Value, accept: fn(std::cmp::Ordering) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).map(accept).unwrap_or(false),
        _ => false,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl WorkflowNode for SwitchNode {
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
        let data = inputs.require("data")?.clone();
        let rules_value = inputs.array("rules")?;
        let mode = inputs.str_or("mode", "first_match");
        let rules = self.parse_rules(rules_value);

        let mut outputs = NodeOutputs::new();
        for rule in &rules {
            if !self.evaluate_rule(&data, rule) {
                continue;
            }
            if rule.output_index < self.output_count {
                outputs.insert(format!("output_{}", rule.output_index), data.clone());
            }
            if mode == "first_match" {
                break;
            }
        }

        if outputs.is_empty() {
            outputs.insert("fallback".to_string(), data);
        }
        Ok(outputs)
    }
}

// ================================
// Merge
// ================================

/// Emits the first non-empty input by ascending index. `selected_index` is
/// -1 and `has_result` false when every input is empty.
pub struct MergeNode {
    input_ports: PortMap,
    output_ports: PortMap,
    input_count: usize,
}

impl MergeNode {
    pub fn new(input_count: usize) -> Self {
        let input_count = input_count.max(1);
        let inputs: Vec<PortDescriptor> = (0..input_count)
            .map(|i| PortDescriptor::new(format!("input_{}", i), PortType::Any, false))
            .collect();

        MergeNode {
            input_ports: port_map(inputs),
            output_ports: port_map(vec![
                PortDescriptor::new("output", PortType::Any, true),
                PortDescriptor::new("selected_index", PortType::Number, true),
                PortDescriptor::new("has_result", PortType::Boolean, true),
            ]),
            input_count,
        }
    }

    pub fn from_config(config: &Map<String, Value>) -> Self {
        let input_count = config
            .get("input_count")
            .and_then(Value::as_u64)
            .unwrap_or(2) as usize;
        Self::new(input_count)
    }
}

#[async_trait]
impl WorkflowNode for MergeNode {
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
        let mut outputs = NodeOutputs::new();
        for i in 0..self.input_count {
            if let Some(value) = inputs.get(&format!("input_{}", i)) {
                if !is_empty_value(value) {
                    outputs.insert("output".to_string(), value.clone());
                    outputs.insert("selected_index".to_string(), json!(i));
                    outputs.insert("has_result".to_string(), json!(true));
                    return Ok(outputs);
                }
            }
        }
        outputs.insert("selected_index".to_string(), json!(-1));
        outputs.insert("has_result".to_string(), json!(false));
        Ok(outputs)
    }
}

// ================================
// PassThrough
// ================================

/// Forwards `data` iff `control` is non-empty or `pass_on_empty` is set;
/// otherwise emits nothing, leaving the branch dark.
pub struct PassThroughNode {
    input_ports: PortMap,
    output_ports: PortMap,
}

impl PassThroughNode {
    pub fn new() -> Self {
        PassThroughNode {
            input_ports: port_map(vec![
                PortDescriptor::new("data", PortType::Any, true),
                PortDescriptor::new("control", PortType::Any, false),
                PortDescriptor::new("pass_on_empty", PortType::Boolean, false)
                    .with_default(json!(false)),
            ]),
            output_ports: port_map(vec![PortDescriptor::new("output", PortType::Any, true)]),
        }
    }
}

#[async_trait]
impl WorkflowNode for PassThroughNode {
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
        let data = inputs.require("data")?.clone();
        let pass_on_empty = inputs.bool_or("pass_on_empty", false);
        let control_open = inputs
            .get("control")
            .map(|v| !is_empty_value(v))
            .unwrap_or(false);

        let mut outputs = NodeOutputs::new();
        if control_open || pass_on_empty {
            outputs.insert("output".to_string(), data);
        }
        Ok(outputs)
    }
}
