//! String-keyed node registry.
//!
//! Maps a node type name to a factory producing a fresh instance with its
//! declared ports. The factory receives the node's static input map so
//! config-sized nodes (Switch `output_count`, Merge `input_count`) can
//! shape their ports at construction time. Read-only after service start.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::WorkflowNode;
use crate::error::{WorkflowError, WorkflowResult};
use crate::port::PortDescriptor;

type NodeFactory = Box<dyn Fn(&Map<String, Value>) -> Arc<dyn WorkflowNode> + Send + Sync>;

struct Registration {
    category: String,
    factory: NodeFactory,
}

/// Registry of node factories by node type string.
pub struct NodeRegistry {
    registrations: HashMap<String, Registration>,
}

impl NodeRegistry {
    /// Registry with all built-in nodes.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        crate::nodes::register_builtins(&mut registry);
        registry
    }

    pub fn empty() -> Self {
        NodeRegistry {
            registrations: HashMap::new(),
        }
    }

    /// Register a node factory under a type name and category.
    pub fn register<F>(&mut self, node_type: &str, category: &str, factory: F)
    where
        F: Fn(&Map<String, Value>) -> Arc<dyn WorkflowNode> + Send + Sync + 'static,
    {
        self.registrations.insert(
            node_type.to_string(),
            Registration {
                category: category.to_string(),
                factory: Box::new(factory),
            },
        );
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.registrations.contains_key(node_type)
    }

    /// Materialize a fresh node instance of the given type.
    pub fn create(
        &self,
        node_type: &str,
        config: &Map<String, Value>,
    ) -> WorkflowResult<Arc<dyn WorkflowNode>> {
        let registration = self
            .registrations
            .get(node_type)
            .ok_or_else(|| WorkflowError::UnknownNodeType(node_type.to_string()))?;
        Ok((registration.factory)(config))
    }

    /// All registered node types with their default port declarations,
    /// grouped for UI consumption.
    pub fn list(&self) -> Vec<NodeTypeInfo> {
        let empty = Map::new();
        let mut infos: Vec<NodeTypeInfo> = self
            .registrations
            .iter()
            .map(|(node_type, registration)| {
                let node = (registration.factory)(&empty);
                NodeTypeInfo {
                    node_type: node_type.clone(),
                    category: registration.category.clone(),
                    input_ports: node.input_ports().values().cloned().collect(),
                    output_ports: node.output_ports().values().cloned().collect(),
                }
            })
            .collect();
        infos.sort_by(|a, b| (&a.category, &a.node_type).cmp(&(&b.category, &b.node_type)));
        infos
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only description of a registered node type.
#[derive(Debug, Clone, Serialize)]
pub struct NodeTypeInfo {
    pub node_type: String,
    pub category: String,
    pub input_ports: Vec<PortDescriptor>,
    pub output_ports: Vec<PortDescriptor>,
}
