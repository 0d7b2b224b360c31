//! Shell command execution
//!
//! Every task yields exactly one [`TaskResult`]. Commands run through
//! `sh -c` with stderr folded into stdout, under a hard deadline. A command
//! that cannot be started, or is killed at the deadline, reports
//! [`ABNORMAL_EXIT_CODE`].

use pioneer_core::{AgentId, Task, TaskResult, ABNORMAL_EXIT_CODE};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tracing::{info, instrument, warn};

pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(60);

/// Captured output beyond this is dropped before reporting.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
    max_output: usize,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_EXEC_TIMEOUT)
    }
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_output: MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, command = %task.command))]
    pub async fn execute(&self, agent_id: &AgentId, task: &Task) -> TaskResult {
        info!("Executing command");

        // `exec 2>&1` makes the shell and everything it runs share one pipe.
        let script = format!("exec 2>&1\n{}", task.command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "Failed to start command");
                return TaskResult::failed(
                    task.id,
                    agent_id.clone(),
                    String::new(),
                    format!("failed to start command: {}", e),
                    ABNORMAL_EXIT_CODE,
                );
            }
        };

        // The pipe is read alongside the wait so a killed command still
        // reports what it printed.
        let mut stdout = child.stdout.take();
        let mut captured = Vec::new();
        let outcome = tokio::time::timeout(self.timeout, async {
            let (read, status) = tokio::join!(
                read_capped(stdout.as_mut(), &mut captured, self.max_output.saturating_add(1)),
                child.wait()
            );
            read.and(status)
        })
        .await;

        let status = match outcome {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to collect command output");
                return TaskResult::failed(
                    task.id,
                    agent_id.clone(),
                    self.capture(&captured),
                    e.to_string(),
                    ABNORMAL_EXIT_CODE,
                );
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Command exceeded its deadline");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed out command");
                }
                return TaskResult::failed(
                    task.id,
                    agent_id.clone(),
                    self.capture(&captured),
                    format!("command timed out after {:?}", self.timeout),
                    ABNORMAL_EXIT_CODE,
                );
            }
        };

        let text = self.capture(&captured);
        if status.success() {
            info!("Command executed successfully");
            return TaskResult::succeeded(task.id, agent_id.clone(), text);
        }

        let (exit_code, error) = match status.code() {
            Some(code) => (code, format!("exit status {}", code)),
            None => (ABNORMAL_EXIT_CODE, "terminated by signal".to_string()),
        };
        warn!(exit_code, "Command failed");
        TaskResult::failed(task.id, agent_id.clone(), text, error, exit_code)
    }

    fn capture(&self, raw: &[u8]) -> String {
        if raw.len() <= self.max_output {
            return String::from_utf8_lossy(raw).into_owned();
        }
        let mut text = String::from_utf8_lossy(&raw[..self.max_output]).into_owned();
        text.push_str(TRUNCATION_MARKER);
        text
    }
}

/// Read `pipe` to EOF, keeping at most `keep` bytes. The rest is drained so
/// the writer never blocks on a full pipe.
async fn read_capped(
    pipe: Option<&mut ChildStdout>,
    captured: &mut Vec<u8>,
    keep: usize,
) -> std::io::Result<()> {
    let Some(pipe) = pipe else {
        return Ok(());
    };
    let mut buf = [0u8; 8192];
    loop {
        let n = pipe.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let room = keep.saturating_sub(captured.len());
        captured.extend_from_slice(&buf[..n.min(room)]);
    }
}
