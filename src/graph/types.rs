//! The executable graph model: nodes keyed by id, typed port connections.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{WorkflowError, WorkflowResult};
use crate::node::WorkflowNode;

/// A directed edge routing one output port's value to one input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

impl Connection {
    pub fn new(
        from_node: impl Into<String>,
        from_port: impl Into<String>,
        to_node: impl Into<String>,
        to_port: impl Into<String>,
    ) -> Self {
        Connection {
            from_node: from_node.into(),
            from_port: from_port.into(),
            to_node: to_node.into(),
            to_port: to_port.into(),
        }
    }
}

/// A node instance placed in a graph: the shared implementation object plus
/// the static input values supplied at graph-construction time.
pub struct GraphNode {
    pub id: String,
    pub node_type: String,
    pub node: Arc<dyn WorkflowNode>,
    pub input_values: HashMap<String, Value>,
}

impl std::fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("input_values", &self.input_values)
            .finish()
    }
}

/// An acyclic collection of nodes and connections.
///
/// Connection invariants are enforced on insert; `validate()` performs the
/// cycle check and precomputes the routing indices the executor reads.
#[derive(Debug)]
pub struct Graph {
    nodes: HashMap<String, GraphNode>,
    connections: Vec<Connection>,
    /// `(to_node, to_port)` → `(from_node, from_port)`; at most one
    /// connection may target a given input port.
    routing: HashMap<(String, String), (String, String)>,
    successors: HashMap<String, Vec<String>>,
    in_degree: HashMap<String, usize>,
    validated: bool,
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            nodes: HashMap::new(),
            connections: Vec::new(),
            routing: HashMap::new(),
            successors: HashMap::new(),
            in_degree: HashMap::new(),
            validated: false,
        }
    }

    pub fn add_node(
        &mut self,
        id: impl Into<String>,
        node_type: impl Into<String>,
        node: Arc<dyn WorkflowNode>,
        input_values: HashMap<String, Value>,
    ) -> WorkflowResult<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            return Err(WorkflowError::GraphBuildError(format!(
                "Duplicate node id: {}",
                id
            )));
        }
        self.nodes.insert(
            id.clone(),
            GraphNode {
                id,
                node_type: node_type.into(),
                node,
                input_values,
            },
        );
        self.validated = false;
        Ok(())
    }

    /// Add a connection, enforcing endpoint, port-direction, single-target
    /// and type-compatibility invariants. Exact duplicates are dropped.
    pub fn add_connection(&mut self, connection: Connection) -> WorkflowResult<()> {
        if self.connections.contains(&connection) {
            return Ok(());
        }

        let source = self.nodes.get(&connection.from_node).ok_or_else(|| {
            WorkflowError::GraphValidationError(format!(
                "Source node '{}' does not exist",
                connection.from_node
            ))
        })?;
        let target = self.nodes.get(&connection.to_node).ok_or_else(|| {
            WorkflowError::GraphValidationError(format!(
                "Target node '{}' does not exist",
                connection.to_node
            ))
        })?;

        let from_port = source
            .node
            .output_ports()
            .get(&connection.from_port)
            .ok_or_else(|| {
                WorkflowError::GraphValidationError(format!(
                    "Output port '{}' not found on node '{}'",
                    connection.from_port, connection.from_node
                ))
            })?;
        let to_port = target
            .node
            .input_ports()
            .get(&connection.to_port)
            .ok_or_else(|| {
                WorkflowError::GraphValidationError(format!(
                    "Input port '{}' not found on node '{}'",
                    connection.to_port, connection.to_node
                ))
            })?;

        if !from_port.port_type.connects_to(to_port.port_type) {
            return Err(WorkflowError::GraphValidationError(format!(
                "Incompatible port types: {}.{} ({}) -> {}.{} ({})",
                connection.from_node,
                connection.from_port,
                from_port.port_type,
                connection.to_node,
                connection.to_port,
                to_port.port_type
            )));
        }

        let target_key = (connection.to_node.clone(), connection.to_port.clone());
        if self.routing.contains_key(&target_key) {
            return Err(WorkflowError::GraphValidationError(format!(
                "Input port {}.{} already has an inbound connection",
                connection.to_node, connection.to_port
            )));
        }

        self.routing.insert(
            target_key,
            (connection.from_node.clone(), connection.from_port.clone()),
        );
        self.connections.push(connection);
        self.validated = false;
        Ok(())
    }

    /// Check the global acyclicity invariant and compute the scheduling
    /// indices (in-degrees, successor lists).
    pub fn validate(&mut self) -> WorkflowResult<()> {
        super::validator::detect_cycle(self)?;

        let mut in_degree: HashMap<String, usize> =
            self.nodes.keys().map(|id| (id.clone(), 0)).collect();
        let mut successors: HashMap<String, Vec<String>> =
            self.nodes.keys().map(|id| (id.clone(), Vec::new())).collect();

        let mut seen_pairs = std::collections::HashSet::new();
        for conn in &self.connections {
            if seen_pairs.insert((conn.from_node.clone(), conn.to_node.clone())) {
                *in_degree.get_mut(&conn.to_node).expect("target exists") += 1;
                successors
                    .get_mut(&conn.from_node)
                    .expect("source exists")
                    .push(conn.to_node.clone());
            }
        }

        self.in_degree = in_degree;
        self.successors = successors;
        self.validated = true;
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn node(&self, id: &str) -> WorkflowResult<&GraphNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| WorkflowError::NodeNotFound(id.to_string()))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The upstream `(node, port)` feeding a given input port, if any.
    pub fn source_for(&self, to_node: &str, to_port: &str) -> Option<&(String, String)> {
        self.routing
            .get(&(to_node.to_string(), to_port.to_string()))
    }

    /// Distinct-predecessor counts, computed by `validate()`.
    pub fn in_degrees(&self) -> &HashMap<String, usize> {
        &self.in_degree
    }

    /// Distinct successor node ids, computed by `validate()`.
    pub fn successors_of(&self, id: &str) -> &[String] {
        self.successors.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with no inbound connections.
    pub fn source_nodes(&self) -> Vec<&str> {
        self.in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Nodes with no outbound connections, i.e. where results terminate.
    pub fn sink_nodes(&self) -> Vec<&str> {
        self.successors
            .iter()
            .filter(|(_, successors)| successors.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
