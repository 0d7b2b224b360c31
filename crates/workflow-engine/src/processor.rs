//! Bounded, asynchronous result processing
//!
//! Result intake only waits for a slot in the buffer; advancing the workflow
//! happens on a worker that runs at most `max_concurrency` advances at once.

use crate::engine::{Advance, WorkflowEngine};
use pioneer_core::{PioneerError, Result, TaskResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    pub buffer: usize,
    pub max_concurrency: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            buffer: 256,
            max_concurrency: 16,
        }
    }
}

/// Counters for monitoring
#[derive(Debug, Default)]
pub struct ProcessorStats {
    accepted: AtomicU64,
    advanced: AtomicU64,
    stale: AtomicU64,
    errors: AtomicU64,
}

impl ProcessorStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn advanced(&self) -> u64 {
        self.advanced.load(Ordering::Relaxed)
    }

    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    fn record(&self, outcome: &Result<Advance>) {
        let counter = match outcome {
            Ok(Advance::Stale) | Ok(Advance::Ignored(_)) => &self.stale,
            Ok(_) => &self.advanced,
            Err(_) => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cloneable intake side handed to request handlers.
#[derive(Debug, Clone)]
pub struct ResultQueue {
    tx: mpsc::Sender<TaskResult>,
    stats: Arc<ProcessorStats>,
}

impl ResultQueue {
    /// Returns once the result is buffered for processing.
    pub async fn enqueue(&self, result: TaskResult) -> Result<()> {
        self.tx
            .send(result)
            .await
            .map_err(|_| PioneerError::ResultProcessorClosed)?;
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> &Arc<ProcessorStats> {
        &self.stats
    }
}

/// Owner of the worker; `shutdown` drains everything already accepted.
#[derive(Debug)]
pub struct ResultProcessorHandle {
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl ResultProcessorHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.worker.await {
            error!(error = %e, "Result processor worker panicked");
        }
    }
}

pub struct ResultProcessor;

impl ResultProcessor {
    pub fn spawn(
        engine: Arc<WorkflowEngine>,
        config: ProcessorConfig,
    ) -> (ResultQueue, ResultProcessorHandle) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(ProcessorStats::default());

        let worker = tokio::spawn(run(
            engine,
            rx,
            shutdown_rx,
            Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            stats.clone(),
        ));
        info!(
            buffer = config.buffer,
            max_concurrency = config.max_concurrency,
            "Result processor started"
        );

        (
            ResultQueue { tx, stats },
            ResultProcessorHandle {
                shutdown: shutdown_tx,
                worker,
            },
        )
    }
}

async fn run(
    engine: Arc<WorkflowEngine>,
    mut rx: mpsc::Receiver<TaskResult>,
    mut shutdown: watch::Receiver<bool>,
    permits: Arc<Semaphore>,
    stats: Arc<ProcessorStats>,
) {
    let mut in_flight = JoinSet::new();
    let mut closing = false;

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(result) = received else { break };
                let Ok(permit) = permits.clone().acquire_owned().await else { break };
                let engine = engine.clone();
                let stats = stats.clone();
                in_flight.spawn(async move {
                    let outcome = engine.advance(&result).await;
                    if let Err(e) = &outcome {
                        error!(task_id = %result.task_id, agent_id = %result.agent_id, error = %e, "Failed to process task result");
                    }
                    stats.record(&outcome);
                    drop(permit);
                });
            }
            _ = shutdown.changed(), if !closing => {
                closing = true;
                debug!("Result processor closing intake");
                rx.close();
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    warn!(error = %e, "Result processing task aborted");
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Result processing task aborted");
        }
    }
    info!("Result processor stopped");
}
