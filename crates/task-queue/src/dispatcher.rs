//! Long-poll dispatcher

use crate::queue::TaskQueueRegistry;
use pioneer_core::Task;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Server-side wait applied to an agent's poll when it does not ask for less.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Dispatcher {
    queues: Arc<TaskQueueRegistry>,
}

impl Dispatcher {
    pub fn new(queues: Arc<TaskQueueRegistry>) -> Self {
        Self { queues }
    }

    pub fn queues(&self) -> &Arc<TaskQueueRegistry> {
        &self.queues
    }

    /// Wait up to `timeout` for the agent's next task.
    ///
    /// `None` means the deadline passed with nothing to do. A task is only
    /// removed from the queue when this resolves with it, so a poll that is
    /// dropped or times out never loses work.
    #[instrument(skip(self))]
    pub async fn next_task(&self, agent_id: &str, timeout: Duration) -> Option<Task> {
        let queue = self.queues.queue_for(agent_id);

        match tokio::time::timeout(timeout, queue.pop()).await {
            Ok(Some(task)) => {
                info!(task_id = %task.id, workflow_id = %task.workflow_id, "Dispatched task to agent");
                Some(task)
            }
            Ok(None) => None,
            Err(_) => {
                debug!("Polling timeout, no tasks for agent");
                None
            }
        }
    }
}
