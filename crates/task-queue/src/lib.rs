//! Per-agent task queues and the long-poll dispatcher.
//!
//! Producers block on a full queue; pollers wait on the queue's own
//! notification without holding any registry lock.

pub use pioneer_core;

mod dispatcher;
mod queue;

pub use dispatcher::{Dispatcher, DEFAULT_POLL_TIMEOUT};
pub use queue::{AgentQueue, QueueStats, TaskQueueRegistry, DEFAULT_QUEUE_CAPACITY};
