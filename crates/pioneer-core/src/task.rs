//! Task and result types exchanged between controller and agents

use crate::agent::AgentId;
use crate::workflow::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type TaskId = Uuid;

/// Exit code reported when a command did not terminate through a normal
/// process exit: spawn failure, deadline kill, or signal.
pub const ABNORMAL_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Diagnostic,
    Remediation,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Diagnostic => f.write_str("diagnostic"),
            TaskKind::Remediation => f.write_str("remediation"),
        }
    }
}

/// A single shell command addressed to one agent. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    pub agent_id: AgentId,
    pub kind: TaskKind,
    pub command: String,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        workflow_id: WorkflowId,
        agent_id: AgentId,
        kind: TaskKind,
        command: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            agent_id,
            kind,
            command: command.into(),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of running a [`Task`], produced exactly once by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub exit_code: i32,
}

impl TaskResult {
    pub fn succeeded(task_id: TaskId, agent_id: AgentId, output: String) -> Self {
        Self {
            task_id,
            agent_id,
            success: true,
            output,
            error: String::new(),
            exit_code: 0,
        }
    }

    pub fn failed(
        task_id: TaskId,
        agent_id: AgentId,
        output: String,
        error: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        Self {
            task_id,
            agent_id,
            success: false,
            output,
            error: error.into(),
            exit_code,
        }
    }

    /// True when the command never reached a normal exit.
    pub fn is_abnormal(&self) -> bool {
        !self.success && self.exit_code == ABNORMAL_EXIT_CODE
    }
}
