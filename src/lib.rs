pub mod error;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod port;
pub mod runtime;

pub use crate::error::{NodeError, WorkflowError, WorkflowResult};
pub use crate::graph::{
    build_graph, validate_sub_workflow, Connection, Graph, SubWorkflowRequest, ValidationReport,
    WorkflowSchema,
};
pub use crate::node::{
    NodeInputs, NodeOutputs, NodeRegistry, NodeTypeInfo, ProcessContext, WorkflowNode,
};
pub use crate::port::{PortDescriptor, PortType};
pub use crate::runtime::{
    EngineConfig, EventEmitter, Executor, NodeState, RunContext, RunEvent, RunRegistry, RunStatus,
    StatusReport, TaskStatus, WorkflowStore,
};
