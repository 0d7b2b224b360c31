pub use pioneer_core;

mod engine;
mod processor;

pub use engine::{Advance, WorkflowEngine};
pub use processor::{
    ProcessorConfig, ProcessorStats, ResultProcessor, ResultProcessorHandle, ResultQueue,
};

// Re-export core types for convenience
pub use pioneer_core::{PioneerError, Result, TaskResult, Workflow, WorkflowId, WorkflowStatus};
