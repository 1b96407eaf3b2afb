pub mod builder;
pub mod schema;
pub mod types;
pub mod validator;

pub use builder::build_graph;
pub use schema::{ConnectionSchema, NodeSchema, WorkflowSchema};
pub use types::{Connection, Graph, GraphNode};
pub use validator::{validate_sub_workflow, SubWorkflowRequest, ValidationReport};
