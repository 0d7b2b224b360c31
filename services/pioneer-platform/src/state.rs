use crate::config::PlatformConfig;
use pioneer_core::{KnowledgeBase, Registry};
use std::sync::Arc;
use std::time::Duration;
use task_queue::{Dispatcher, TaskQueueRegistry};
use workflow_engine::{
    ProcessorConfig, ResultProcessor, ResultProcessorHandle, ResultQueue, WorkflowEngine,
};

/// Shared handler state. Cloning is cheap; every component is behind an `Arc`.
#[derive(Clone)]
pub struct PlatformState {
    pub registry: Arc<dyn Registry>,
    pub engine: Arc<WorkflowEngine>,
    pub dispatcher: Dispatcher,
    pub results: ResultQueue,
    pub poll_timeout: Duration,
}

impl PlatformState {
    /// Wire the queue registry, workflow engine and result processor together.
    /// The returned handle owns the processor worker and must be shut down
    /// after the HTTP server stops.
    pub fn build(
        config: &PlatformConfig,
        registry: Arc<dyn Registry>,
        knowledge_base: Arc<dyn KnowledgeBase>,
    ) -> (Self, ResultProcessorHandle) {
        let queues = Arc::new(TaskQueueRegistry::new(config.queue_capacity));
        let engine = Arc::new(WorkflowEngine::new(
            registry.clone(),
            knowledge_base,
            queues.clone(),
        ));
        let (results, processor) = ResultProcessor::spawn(
            engine.clone(),
            ProcessorConfig {
                buffer: config.result_buffer,
                max_concurrency: config.result_concurrency,
            },
        );

        let state = Self {
            registry,
            engine,
            dispatcher: Dispatcher::new(queues),
            results,
            poll_timeout: config.poll_timeout(),
        };
        (state, processor)
    }
}
