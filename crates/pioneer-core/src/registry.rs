//! Durable registry seam: agent identity/liveness and workflow records

use crate::agent::{Agent, AgentId, AgentStatus};
use crate::error::{PioneerError, Result};
use crate::task::TaskId;
use crate::workflow::{Workflow, WorkflowId, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Pointer to the task a workflow is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentTask {
    pub task_id: TaskId,
    pub diagnostic_step: usize,
}

/// The row state a status write was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedState {
    pub status: WorkflowStatus,
    pub current_task_id: Option<TaskId>,
}

impl From<&Workflow> for ExpectedState {
    fn from(workflow: &Workflow) -> Self {
        Self {
            status: workflow.status,
            current_task_id: workflow.current_task_id,
        }
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// Returns the agent and whether it was newly created. Agents are
    /// deduplicated by hostname + IP address.
    async fn register_agent(&self, hostname: &str, ip_address: &str, os: &str)
        -> Result<(Agent, bool)>;

    async fn record_heartbeat(&self, agent_id: &str) -> Result<Agent>;

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;

    async fn agent_status(&self, agent_id: &str) -> Result<AgentStatus>;

    /// Flip every online agent last seen before `cutoff` to offline.
    async fn mark_stale_agents_offline(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    async fn create_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Row-level compare-and-set. Fails with `WorkflowConflict` unless the
    /// stored status and task pointer still equal `expected`. `current` of
    /// `None` leaves the task pointer as is.
    async fn update_workflow_status(
        &self,
        workflow_id: WorkflowId,
        expected: ExpectedState,
        status: WorkflowStatus,
        current: Option<CurrentTask>,
    ) -> Result<()>;

    async fn find_workflow_by_current_task(
        &self,
        agent_id: &str,
        task_id: TaskId,
    ) -> Result<Option<Workflow>>;

    async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Option<Workflow>>;

    async fn list_workflows(&self) -> Result<Vec<Workflow>>;
}

/// Process-local registry. Each method takes its lock for the duration of a
/// single row operation only.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    agents: RwLock<HashMap<AgentId, Agent>>,
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an agent directly, bypassing registration.
    pub fn insert_agent(&self, agent: Agent) {
        self.agents.write().insert(agent.id.clone(), agent);
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn register_agent(
        &self,
        hostname: &str,
        ip_address: &str,
        os: &str,
    ) -> Result<(Agent, bool)> {
        let mut agents = self.agents.write();
        if let Some(existing) = agents
            .values()
            .find(|a| a.hostname == hostname && a.ip_address == ip_address)
        {
            return Ok((existing.clone(), false));
        }

        let agent = Agent::new(hostname.to_string(), ip_address.to_string(), os.to_string());
        agents.insert(agent.id.clone(), agent.clone());
        info!(agent_id = %agent.id, hostname, ip_address, "Registered new agent");
        Ok((agent, true))
    }

    async fn record_heartbeat(&self, agent_id: &str) -> Result<Agent> {
        let mut agents = self.agents.write();
        let agent = agents
            .get_mut(agent_id)
            .ok_or_else(|| PioneerError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })?;
        agent.status = AgentStatus::Online;
        agent.last_seen = Utc::now();
        Ok(agent.clone())
    }

    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.agents.read().get(agent_id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut agents: Vec<Agent> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    async fn agent_status(&self, agent_id: &str) -> Result<AgentStatus> {
        self.agents
            .read()
            .get(agent_id)
            .map(|a| a.status)
            .ok_or_else(|| PioneerError::AgentNotFound {
                agent_id: agent_id.to_string(),
            })
    }

    async fn mark_stale_agents_offline(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut agents = self.agents.write();
        let mut count = 0;
        for agent in agents
            .values_mut()
            .filter(|a| a.is_online() && a.last_seen < cutoff)
        {
            agent.status = AgentStatus::Offline;
            debug!(agent_id = %agent.id, last_seen = %agent.last_seen, "Agent went offline");
            count += 1;
        }
        Ok(count)
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = self.workflows.write();
        if workflows.contains_key(&workflow.id) {
            return Err(PioneerError::Storage {
                reason: format!("workflow {} already exists", workflow.id),
            });
        }
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn update_workflow_status(
        &self,
        workflow_id: WorkflowId,
        expected: ExpectedState,
        status: WorkflowStatus,
        current: Option<CurrentTask>,
    ) -> Result<()> {
        let mut workflows = self.workflows.write();
        let workflow = workflows
            .get_mut(&workflow_id)
            .ok_or_else(|| PioneerError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })?;
        if ExpectedState::from(&*workflow) != expected {
            debug!(%workflow_id, stored = %workflow.status, expected = %expected.status, "Rejected stale workflow update");
            return Err(PioneerError::WorkflowConflict {
                workflow_id: workflow_id.to_string(),
            });
        }
        workflow.status = status;
        if let Some(current) = current {
            workflow.current_task_id = Some(current.task_id);
            workflow.diagnostic_step = current.diagnostic_step;
        }
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn find_workflow_by_current_task(
        &self,
        agent_id: &str,
        task_id: TaskId,
    ) -> Result<Option<Workflow>> {
        Ok(self
            .workflows
            .read()
            .values()
            .find(|w| w.agent_id == agent_id && w.current_task_id == Some(task_id))
            .cloned())
    }

    async fn get_workflow(&self, workflow_id: WorkflowId) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().get(&workflow_id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        let mut workflows: Vec<Workflow> = self.workflows.read().values().cloned().collect();
        workflows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(workflows)
    }
}
