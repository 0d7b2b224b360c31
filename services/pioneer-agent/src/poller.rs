//! Task polling loop
//!
//! Fetches are sequential; each fetched task runs on its own so a slow
//! command never delays the next poll.

use crate::client::ControllerApi;
use crate::executor::CommandExecutor;
use pioneer_core::{AgentId, Task, TaskResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(10);

pub struct Poller {
    client: Arc<dyn ControllerApi>,
    executor: Arc<CommandExecutor>,
    agent_id: AgentId,
    backoff: Duration,
}

impl Poller {
    pub fn new(
        client: Arc<dyn ControllerApi>,
        executor: CommandExecutor,
        agent_id: AgentId,
    ) -> Self {
        Self {
            client,
            executor: Arc::new(executor),
            agent_id,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run until `shutdown` flips. Commands already started still report
    /// their results before this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(agent_id = %self.agent_id, "Task polling started");
        let mut in_flight = JoinSet::new();

        loop {
            let fetched = tokio::select! {
                fetched = self.client.fetch_task(&self.agent_id) => fetched,
                _ = shutdown.changed() => break,
            };

            match fetched {
                Ok(Some(task)) => {
                    info!(task_id = %task.id, command = %task.command, "New task received");
                    in_flight.spawn(self.run_task(task, shutdown.clone()));
                }
                Ok(None) => debug!("Poll returned no task"),
                Err(e) => {
                    warn!(error = %e, backoff = ?self.backoff, "Failed to fetch task, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(self.backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!(error = %e, "Task execution aborted");
                }
            }
        }

        if !in_flight.is_empty() {
            info!(running = in_flight.len(), "Waiting for running tasks to report");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Task execution aborted");
            }
        }
        info!("Task polling stopped");
    }

    fn run_task(
        &self,
        task: Task,
        shutdown: watch::Receiver<bool>,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let client = self.client.clone();
        let executor = self.executor.clone();
        let agent_id = self.agent_id.clone();
        let backoff = self.backoff;
        async move {
            let result = executor.execute(&agent_id, &task).await;
            report_result(client.as_ref(), &result, backoff, shutdown).await;
        }
    }
}

/// Post `result`, retrying every `backoff` until it is accepted. Once
/// shutdown is signalled a failed post is given up after one more attempt.
async fn report_result(
    client: &dyn ControllerApi,
    result: &TaskResult,
    backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match client.post_result(result).await {
            Ok(()) => {
                info!(task_id = %result.task_id, success = result.success, "Task result posted");
                return;
            }
            Err(e) if *shutdown.borrow() => {
                error!(task_id = %result.task_id, error = %e, "Failed to post task result, giving up");
                return;
            }
            Err(e) => {
                warn!(task_id = %result.task_id, error = %e, backoff = ?backoff, "Failed to post task result, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    Ok(()) = shutdown.changed() => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pioneer_core::{PioneerError, Result, TaskKind};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedController {
        polls: Mutex<VecDeque<Result<Option<Task>>>>,
        fetches: AtomicUsize,
        fetch_delay: Duration,
        failing_posts: AtomicUsize,
        post_attempts: AtomicUsize,
        results: Mutex<Vec<TaskResult>>,
    }

    impl ScriptedController {
        fn with_polls(polls: Vec<Result<Option<Task>>>) -> Arc<Self> {
            Arc::new(Self {
                polls: Mutex::new(polls.into()),
                ..Default::default()
            })
        }

        fn results(&self) -> Vec<TaskResult> {
            self.results.lock().clone()
        }
    }

    #[async_trait]
    impl ControllerApi for ScriptedController {
        async fn register(&self, _: &str, _: &str, _: &str) -> Result<String> {
            Ok("A1".into())
        }

        async fn heartbeat(&self, _: &str) -> Result<()> {
            Ok(())
        }

        async fn fetch_task(&self, _: &str) -> Result<Option<Task>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = self.polls.lock().pop_front();
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            match next {
                Some(poll) => poll,
                None => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(None)
                }
            }
        }

        async fn post_result(&self, result: &TaskResult) -> Result<()> {
            self.post_attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failing_posts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(PioneerError::AgentCommunicationError {
                    reason: "connection reset by peer".into(),
                });
            }
            self.results.lock().push(result.clone());
            Ok(())
        }
    }

    fn task(command: &str) -> Task {
        Task::new(uuid::Uuid::new_v4(), "A1".into(), TaskKind::Diagnostic, command)
    }

    async fn wait_for_results(controller: &ScriptedController, count: usize) {
        for _ in 0..200 {
            if controller.results().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} results, got {:?}", controller.results());
    }

    #[tokio::test]
    async fn test_each_task_reports_exactly_once() {
        let first = task("echo one");
        let second = task("exit 4");
        let controller = ScriptedController::with_polls(vec![
            Ok(Some(first.clone())),
            Ok(None),
            Ok(Some(second.clone())),
        ]);
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into());
        let running = tokio::spawn(poller.run(rx));

        wait_for_results(&controller, 2).await;
        tx.send(true).unwrap();
        running.await.unwrap();

        let results = controller.results();
        assert_eq!(results.len(), 2);
        let one = results.iter().find(|r| r.task_id == first.id).unwrap();
        assert!(one.success);
        assert_eq!(one.output, "one\n");
        let four = results.iter().find(|r| r.task_id == second.id).unwrap();
        assert_eq!(four.exit_code, 4);
    }

    #[tokio::test]
    async fn test_fetch_errors_back_off_then_resume() {
        let queued = task("echo recovered");
        let controller = ScriptedController::with_polls(vec![
            Err(PioneerError::AgentCommunicationError {
                reason: "connection refused".into(),
            }),
            Ok(Some(queued.clone())),
        ]);
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into())
            .with_backoff(Duration::from_millis(30));
        let running = tokio::spawn(poller.run(rx));

        wait_for_results(&controller, 1).await;
        tx.send(true).unwrap();
        running.await.unwrap();

        assert_eq!(controller.results()[0].task_id, queued.id);
        assert!(controller.fetches.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_running_commands() {
        let slow = task("sleep 0.3; echo done");
        let controller = ScriptedController::with_polls(vec![Ok(Some(slow.clone()))]);
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into());
        let running = tokio::spawn(poller.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        running.await.unwrap();

        let results = controller.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].output, "done\n");
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let controller =
            ScriptedController::with_polls(vec![Err(PioneerError::AgentCommunicationError {
                reason: "controller down".into(),
            })]);
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into())
            .with_backoff(Duration::from_secs(3600));
        let running = tokio::spawn(poller.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("poller should stop during backoff")
            .unwrap();
        assert!(controller.results().is_empty());
    }

    #[tokio::test]
    async fn test_task_dequeued_by_slow_poll_is_not_lost() {
        let quick = task("true");
        let second = task("echo second");
        let controller = Arc::new(ScriptedController {
            polls: Mutex::new(vec![Ok(Some(quick.clone())), Ok(Some(second.clone()))].into()),
            fetch_delay: Duration::from_millis(200),
            ..Default::default()
        });
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into());
        let running = tokio::spawn(poller.run(rx));

        // The second poll dequeues immediately and replies while `true` finishes.
        wait_for_results(&controller, 2).await;
        tx.send(true).unwrap();
        running.await.unwrap();

        let results = controller.results();
        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.task_id == quick.id && r.success));
        let echoed = results.iter().find(|r| r.task_id == second.id).unwrap();
        assert_eq!(echoed.output, "second\n");
    }

    #[tokio::test]
    async fn test_failed_result_post_is_retried() {
        let queued = task("echo persisted");
        let controller = Arc::new(ScriptedController {
            polls: Mutex::new(vec![Ok(Some(queued.clone()))].into()),
            failing_posts: AtomicUsize::new(2),
            ..Default::default()
        });
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into())
            .with_backoff(Duration::from_millis(20));
        let running = tokio::spawn(poller.run(rx));

        wait_for_results(&controller, 1).await;
        tx.send(true).unwrap();
        running.await.unwrap();

        let results = controller.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].task_id, queued.id);
        assert_eq!(results[0].output, "persisted\n");
        assert_eq!(controller.post_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_post_retries() {
        let queued = task("true");
        let controller = Arc::new(ScriptedController {
            polls: Mutex::new(vec![Ok(Some(queued))].into()),
            failing_posts: AtomicUsize::new(usize::MAX),
            ..Default::default()
        });
        let (tx, rx) = watch::channel(false);
        let poller = Poller::new(controller.clone(), CommandExecutor::default(), "A1".into())
            .with_backoff(Duration::from_secs(3600));
        let running = tokio::spawn(poller.run(rx));

        for _ in 0..200 {
            if controller.post_attempts.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("poller should stop while retrying a post")
            .unwrap();

        assert!(controller.results().is_empty());
        assert_eq!(controller.post_attempts.load(Ordering::SeqCst), 2);
    }
}
