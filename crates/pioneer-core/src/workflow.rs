//! Workflow records and the status transition table

use crate::agent::AgentId;
use crate::error::{PioneerError, Result};
use crate::knowledge::KbId;
use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type WorkflowId = Uuid;

/// Lifecycle of a diagnose/remediate run.
///
/// ```text
/// pending -> diagnosing -> remediating -> completed
///               |  ^  |         |
///               +--+  |         +-> failed
///          next step  +-> completed
///                     +-> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Diagnosing,
    Remediating,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 5] = [
        WorkflowStatus::Pending,
        WorkflowStatus::Diagnosing,
        WorkflowStatus::Remediating,
        WorkflowStatus::Completed,
        WorkflowStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }

    /// The only edges a workflow may take. Everything else is rejected.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        matches!(
            (self, next),
            (Pending, Diagnosing)
                | (Diagnosing, Remediating)
                | (Diagnosing, Completed)
                | (Diagnosing, Failed)
                | (Remediating, Completed)
                | (Remediating, Failed)
        )
    }

    /// Moving to the next diagnostic step keeps the status unchanged and is
    /// only allowed while diagnosing.
    pub fn can_advance_step(self) -> bool {
        self == WorkflowStatus::Diagnosing
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Diagnosing => "diagnosing",
            WorkflowStatus::Remediating => "remediating",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub kb_id: KbId,
    pub agent_id: AgentId,
    pub status: WorkflowStatus,
    /// The single task whose result this workflow is waiting on.
    pub current_task_id: Option<TaskId>,
    /// Index of the diagnostic step behind `current_task_id` while diagnosing.
    #[serde(default)]
    pub diagnostic_step: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(agent_id: AgentId, kb_id: KbId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kb_id,
            agent_id,
            status: WorkflowStatus::Pending,
            current_task_id: None,
            diagnostic_step: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check an edge against the transition table without mutating.
    pub fn check_transition(&self, next: WorkflowStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(PioneerError::InvalidTransition {
                from: self.status,
                to: next,
            })
        }
    }

    /// Check the diagnosing -> diagnosing step edge.
    pub fn check_step_advance(&self) -> Result<()> {
        if self.status.can_advance_step() {
            Ok(())
        } else {
            Err(PioneerError::InvalidTransition {
                from: self.status,
                to: WorkflowStatus::Diagnosing,
            })
        }
    }
}
