//! Task Queue Registry
//!
//! Maps an agent id to a bounded FIFO of pending tasks. The map is a
//! `DashMap`, so create-if-absent runs under the owning shard's write lock
//! and two first contacts for the same agent always observe one queue.

use dashmap::DashMap;
use pioneer_core::{AgentId, PioneerError, Result, Task};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Bounded multi-producer multi-consumer queue for one agent.
///
/// Both channel ends are owned here so the channel never closes while the
/// registry holds the queue.
#[derive(Debug)]
pub struct AgentQueue {
    agent_id: AgentId,
    tx: async_channel::Sender<Task>,
    rx: async_channel::Receiver<Task>,
}

impl AgentQueue {
    fn new(agent_id: AgentId, capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { agent_id, tx, rx }
    }

    /// Waits while the queue is full.
    pub async fn push(&self, task: Task) -> Result<()> {
        self.tx
            .send(task)
            .await
            .map_err(|_| PioneerError::QueueClosed {
                agent_id: self.agent_id.clone(),
            })
    }

    /// Waits until a task is available. Dropping the returned future before
    /// it resolves leaves the queue untouched.
    pub async fn pop(&self) -> Option<Task> {
        self.rx.recv().await.ok()
    }

    pub fn try_pop(&self) -> Option<Task> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Registry statistics for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub queues: usize,
    pub pending_tasks: usize,
}

#[derive(Debug)]
pub struct TaskQueueRegistry {
    queues: DashMap<AgentId, Arc<AgentQueue>>,
    capacity: usize,
}

impl TaskQueueRegistry {
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "Task queue registry initialized");
        Self {
            queues: DashMap::new(),
            capacity,
        }
    }

    /// Returns the agent's queue, creating it on first access.
    pub fn queue_for(&self, agent_id: &str) -> Arc<AgentQueue> {
        if let Some(queue) = self.queues.get(agent_id) {
            return queue.value().clone();
        }
        self.queues
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                info!(agent_id, "Created new task queue for agent");
                Arc::new(AgentQueue::new(agent_id.to_string(), self.capacity))
            })
            .value()
            .clone()
    }

    /// Enqueue a task for its target agent, waiting while that queue is full.
    #[instrument(skip(self, task), fields(agent_id = %task.agent_id, task_id = %task.id))]
    pub async fn submit(&self, task: Task) -> Result<()> {
        let queue = self.queue_for(&task.agent_id);
        debug!(command = %task.command, kind = %task.kind, "Submitting task");
        queue.push(task).await
    }

    pub fn depth(&self, agent_id: &str) -> usize {
        self.queues.get(agent_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            queues: self.queues.len(),
            pending_tasks: 0,
        };
        for entry in self.queues.iter() {
            stats.pending_tasks += entry.value().len();
        }
        stats
    }
}

impl Default for TaskQueueRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
