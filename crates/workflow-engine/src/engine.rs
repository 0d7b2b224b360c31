//! Workflow Engine
//!
//! Drives a knowledge-base plan through `pending -> diagnosing ->
//! (remediating) -> completed | failed`. Each workflow has exactly one
//! outstanding task; a result only advances the workflow whose current-task
//! pointer it names.

use pioneer_core::{
    AgentStatus, CurrentTask, ExpectedState, KnowledgeBase, KnowledgeBaseItem, PioneerError, Registry, Result,
    Task, TaskKind, TaskResult, Workflow, WorkflowId, WorkflowStatus,
};
use std::sync::Arc;
use task_queue::TaskQueueRegistry;
use tracing::{error, info, instrument, warn};

/// What a reported result did to its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// No workflow is waiting on this task, or another result for the same
    /// task moved the workflow on first.
    Stale,
    /// A workflow matched but its status accepts no results.
    Ignored(WorkflowStatus),
    /// Still diagnosing; the next diagnostic step was submitted.
    NextStep { step: usize },
    Transitioned {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
}

#[derive(Clone)]
pub struct WorkflowEngine {
    registry: Arc<dyn Registry>,
    knowledge_base: Arc<dyn KnowledgeBase>,
    queues: Arc<TaskQueueRegistry>,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("queues", &self.queues.stats())
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(
        registry: Arc<dyn Registry>,
        knowledge_base: Arc<dyn KnowledgeBase>,
        queues: Arc<TaskQueueRegistry>,
    ) -> Self {
        Self {
            registry,
            knowledge_base,
            queues,
        }
    }

    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn queues(&self) -> &Arc<TaskQueueRegistry> {
        &self.queues
    }

    /// Start a workflow for `kb_id` on an online agent and queue its first
    /// diagnostic task.
    #[instrument(skip(self))]
    pub async fn start(&self, agent_id: &str, kb_id: &str) -> Result<WorkflowId> {
        if self.registry.agent_status(agent_id).await? != AgentStatus::Online {
            return Err(PioneerError::AgentOffline {
                agent_id: agent_id.to_string(),
            });
        }

        let plan = self.knowledge_base.lookup(kb_id).await?;
        let command = plan
            .diagnostic_command(0)
            .ok_or_else(|| PioneerError::EmptyDiagnosticPlan {
                kb_id: kb_id.to_string(),
            })?;

        let workflow = Workflow::new(agent_id.to_string(), kb_id.to_string());
        self.registry.create_workflow(&workflow).await?;
        info!(workflow_id = %workflow.id, steps = plan.diagnostics.len(), "Created workflow");

        let task = Task::new(workflow.id, workflow.agent_id.clone(), TaskKind::Diagnostic, command);
        let outcome = self
            .transition(
                &workflow,
                WorkflowStatus::Diagnosing,
                Some(CurrentTask {
                    task_id: task.id,
                    diagnostic_step: 0,
                }),
            )
            .await?;
        if outcome == Advance::Stale {
            return Err(PioneerError::WorkflowConflict {
                workflow_id: workflow.id.to_string(),
            });
        }
        self.queues.submit(task).await?;

        Ok(workflow.id)
    }

    /// Apply one reported result. Results that match no outstanding task are
    /// dropped without touching any workflow.
    #[instrument(skip(self, result), fields(task_id = %result.task_id, agent_id = %result.agent_id, success = result.success))]
    pub async fn advance(&self, result: &TaskResult) -> Result<Advance> {
        let workflow = match self
            .registry
            .find_workflow_by_current_task(&result.agent_id, result.task_id)
            .await?
        {
            Some(workflow) => workflow,
            None => {
                warn!("Cannot find workflow for this task result, discarding");
                return Ok(Advance::Stale);
            }
        };

        if workflow.status.is_terminal() {
            info!(workflow_id = %workflow.id, status = %workflow.status, "Ignoring result for finished workflow");
            return Ok(Advance::Ignored(workflow.status));
        }

        let plan = match self.knowledge_base.lookup(&workflow.kb_id).await {
            Ok(plan) => plan,
            Err(e) => {
                error!(workflow_id = %workflow.id, kb_id = %workflow.kb_id, error = %e, "Cannot find KB item for task result");
                return self.transition(&workflow, WorkflowStatus::Failed, None).await;
            }
        };

        match workflow.status {
            WorkflowStatus::Diagnosing => self.on_diagnostic_result(&workflow, &plan, result).await,
            WorkflowStatus::Remediating => self.on_remediation_result(&workflow, result).await,
            status => {
                warn!(workflow_id = %workflow.id, %status, "Received task result for a workflow in an unexpected state");
                Ok(Advance::Ignored(status))
            }
        }
    }

    async fn on_diagnostic_result(
        &self,
        workflow: &Workflow,
        plan: &KnowledgeBaseItem,
        result: &TaskResult,
    ) -> Result<Advance> {
        if !result.success {
            error!(
                workflow_id = %workflow.id,
                exit_code = result.exit_code,
                error = %result.error,
                output = %result.output,
                "Diagnostic step failed"
            );
            return self.transition(workflow, WorkflowStatus::Failed, None).await;
        }

        let next_step = workflow.diagnostic_step + 1;
        if let Some(command) = plan.diagnostic_command(next_step) {
            let task = Task::new(workflow.id, workflow.agent_id.clone(), TaskKind::Diagnostic, command);
            workflow.check_step_advance().inspect_err(|e| {
                warn!(workflow_id = %workflow.id, error = %e, "Rejected diagnostic step");
            })?;
            let current = CurrentTask {
                task_id: task.id,
                diagnostic_step: next_step,
            };
            if !self.persist(workflow, WorkflowStatus::Diagnosing, Some(current)).await? {
                return Ok(Advance::Stale);
            }
            info!(workflow_id = %workflow.id, step = next_step, "Diagnostic step succeeded, submitting next step");
            self.queues.submit(task).await?;
            return Ok(Advance::NextStep { step: next_step });
        }

        match plan.remediation_command() {
            Some(command) => {
                info!(workflow_id = %workflow.id, "Diagnostics succeeded, proceeding to remediation");
                let task = Task::new(workflow.id, workflow.agent_id.clone(), TaskKind::Remediation, command);
                let outcome = self
                    .transition(
                        workflow,
                        WorkflowStatus::Remediating,
                        Some(CurrentTask {
                            task_id: task.id,
                            diagnostic_step: workflow.diagnostic_step,
                        }),
                    )
                    .await?;
                if outcome != Advance::Stale {
                    self.queues.submit(task).await?;
                }
                Ok(outcome)
            }
            None => {
                info!(workflow_id = %workflow.id, "No remediation step, workflow completed");
                self.transition(workflow, WorkflowStatus::Completed, None).await
            }
        }
    }

    async fn on_remediation_result(&self, workflow: &Workflow, result: &TaskResult) -> Result<Advance> {
        if result.success {
            info!(workflow_id = %workflow.id, "Remediation step succeeded, workflow completed");
            self.transition(workflow, WorkflowStatus::Completed, None).await
        } else {
            error!(
                workflow_id = %workflow.id,
                exit_code = result.exit_code,
                error = %result.error,
                output = %result.output,
                "Remediation step failed"
            );
            self.transition(workflow, WorkflowStatus::Failed, None).await
        }
    }

    /// Persist a status change that the transition table allows. Callers
    /// submit follow-up tasks only after this returns `Transitioned`.
    async fn transition(
        &self,
        workflow: &Workflow,
        next: WorkflowStatus,
        current: Option<CurrentTask>,
    ) -> Result<Advance> {
        workflow.check_transition(next).inspect_err(|e| {
            warn!(workflow_id = %workflow.id, error = %e, "Rejected workflow transition");
        })?;

        if !self.persist(workflow, next, current).await? {
            return Ok(Advance::Stale);
        }

        info!(workflow_id = %workflow.id, from = %workflow.status, to = %next, "Workflow transitioned");
        Ok(Advance::Transitioned {
            from: workflow.status,
            to: next,
        })
    }

    /// Write `next` only if the stored row still matches `workflow`. Returns
    /// `false` when a concurrent advance got there first.
    async fn persist(
        &self,
        workflow: &Workflow,
        next: WorkflowStatus,
        current: Option<CurrentTask>,
    ) -> Result<bool> {
        match self
            .registry
            .update_workflow_status(workflow.id, ExpectedState::from(workflow), next, current)
            .await
        {
            Ok(()) => Ok(true),
            Err(PioneerError::WorkflowConflict { .. }) => {
                info!(workflow_id = %workflow.id, status = %next, "Workflow changed while applying result, discarding");
                Ok(false)
            }
            Err(e) => {
                error!(workflow_id = %workflow.id, status = %next, error = %e, "Failed to update workflow status");
                Err(e)
            }
        }
    }
}
