pub mod context;
pub mod events;
pub mod executor;
pub mod resolver;
pub mod run_registry;
pub mod store;

pub use context::{EngineConfig, NodeState, RunContext, RunError, RunStatus};
pub use events::{EventEmitter, RunEvent};
pub use executor::Executor;
pub use run_registry::{RunRegistry, StatusReport, TaskStatus};
pub use store::{WorkflowEntry, WorkflowStore};
