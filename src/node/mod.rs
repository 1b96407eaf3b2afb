//! The node contract: declared ports plus an async `process()`.
//!
//! Node implementations are stateless trait objects. All per-run data flows
//! in through [`NodeInputs`] (resolved by the executor just before dispatch)
//! and out through the returned output map; the engine never mutates a node
//! instance.

mod registry;

pub use registry::{NodeRegistry, NodeTypeInfo};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::NodeError;
use crate::port::PortDescriptor;
use crate::runtime::{EngineConfig, EventEmitter, RunContext};

/// Declared ports of a node, keyed by port name.
pub type PortMap = HashMap<String, PortDescriptor>;

/// Outputs produced by one `process()` call, keyed by output port name.
/// A port that is not present in the map is absent downstream.
pub type NodeOutputs = HashMap<String, Value>;

/// Build a [`PortMap`] from a list of descriptors.
pub fn port_map(ports: Vec<PortDescriptor>) -> PortMap {
    ports.into_iter().map(|p| (p.name.clone(), p)).collect()
}

/// Effective inputs for one node execution. Optional ports without a value
/// are simply absent from the map.
#[derive(Debug, Clone, Default)]
pub struct NodeInputs(HashMap<String, Value>);

impl NodeInputs {
    pub fn new(values: HashMap<String, Value>) -> Self {
        NodeInputs(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn require(&self, name: &str) -> Result<&Value, NodeError> {
        self.0.get(name).ok_or_else(|| NodeError::missing_input(name))
    }

    pub fn str(&self, name: &str) -> Result<&str, NodeError> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| NodeError::invalid_value(name, "expected a string"))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.opt_str(name).unwrap_or(default)
    }

    pub fn f64(&self, name: &str) -> Result<f64, NodeError> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| NodeError::invalid_value(name, "expected a number"))
    }

    pub fn opt_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn opt_usize(&self, name: &str) -> Option<usize> {
        self.opt_f64(name).map(|v| v.max(0.0) as usize)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.0.get(name).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn array(&self, name: &str) -> Result<&Vec<Value>, NodeError> {
        self.require(name)?
            .as_array()
            .ok_or_else(|| NodeError::invalid_value(name, "expected an array"))
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.0
    }
}

/// Execution context handed to every `process()` call.
///
/// Carries the per-run state (cancellation, statuses), the node registry
/// (needed by container nodes to materialize sub-graphs) and the engine
/// configuration. Cheap to clone.
#[derive(Clone)]
pub struct ProcessContext {
    pub run: Arc<RunContext>,
    pub registry: Arc<NodeRegistry>,
    pub events: EventEmitter,
    pub config: EngineConfig,
}

impl ProcessContext {
    pub fn new(
        run: Arc<RunContext>,
        registry: Arc<NodeRegistry>,
        events: EventEmitter,
        config: EngineConfig,
    ) -> Self {
        ProcessContext {
            run,
            registry,
            events,
            config,
        }
    }

    /// The cancel signal of the enclosing run.
    pub fn cancel_token(&self) -> &CancellationToken {
        self.run.cancel_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.run.cancel_token().is_cancelled()
    }

    /// Derive a context for a child run whose cancel signal is chained to
    /// this run's signal.
    pub fn child(&self) -> ProcessContext {
        ProcessContext {
            run: Arc::new(self.run.child()),
            registry: self.registry.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }
}

/// A unit of computation with declared input and output ports.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    fn input_ports(&self) -> &PortMap;

    fn output_ports(&self) -> &PortMap;

    /// Run the node against its effective inputs. Outputs absent from the
    /// returned map are absent on the wire.
    async fn process(
        &self,
        ctx: &ProcessContext,
        inputs: NodeInputs,
    ) -> Result<NodeOutputs, NodeError>;
}

impl std::fmt::Debug for dyn WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn WorkflowNode")
            .field("input_ports", self.input_ports())
            .field("output_ports", self.output_ports())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> NodeInputs {
        NodeInputs::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_require_missing() {
        let i = inputs(&[]);
        assert!(matches!(
            i.require("text").unwrap_err(),
            NodeError::MissingRequiredInput { .. }
        ));
    }

    #[test]
    fn test_typed_accessors() {
        let i = inputs(&[
            ("text", json!("hi")),
            ("n", json!(2.5)),
            ("flag", json!(true)),
            ("items", json!([1, 2])),
        ]);
        assert_eq!(i.str("text").unwrap(), "hi");
        assert_eq!(i.f64("n").unwrap(), 2.5);
        assert!(i.bool_or("flag", false));
        assert!(!i.bool_or("absent", false));
        assert_eq!(i.array("items").unwrap().len(), 2);
        assert_eq!(i.str_or("absent", "d"), "d");
    }

    #[test]
    fn test_wrong_shape_is_invalid_value() {
        let i = inputs(&[("n", json!("nan"))]);
        assert!(matches!(
            i.f64("n").unwrap_err(),
            NodeError::InvalidValue { .. }
        ));
    }
}
