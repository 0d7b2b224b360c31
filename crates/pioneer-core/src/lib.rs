//! # Pioneer Core
//!
//! Core types and traits for the Pioneer remote remediation platform.
//!
//! ## Controller
//! - Per-agent task queues drained by long-polling agents
//! - Knowledge-base driven diagnose/remediate workflows
//!
//! ## Agent
//! - Shell command execution under a hard deadline
//! - Exactly one structured result per dispatched task

pub mod agent;
pub mod error;
pub mod knowledge;
pub mod registry;
pub mod task;
pub mod workflow;

pub use agent::{Agent, AgentId, AgentStatus};
pub use error::{PioneerError, Result};
pub use knowledge::{
    DiagnosticStep, FileKnowledgeBase, KbId, KnowledgeBase, KnowledgeBaseItem, RemediationStep,
};
pub use registry::{CurrentTask, ExpectedState, MemoryRegistry, Registry};
pub use task::{Task, TaskId, TaskKind, TaskResult, ABNORMAL_EXIT_CODE};
pub use workflow::{Workflow, WorkflowId, WorkflowStatus};

/// Current Pioneer version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pioneer build information for telemetry and debugging
pub const BUILD_INFO: &str = concat!(
    "Pioneer ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Standard API endpoints shared by the controller, agent and CLI
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const METRICS: &str = "/metrics";
    pub const AGENT_REGISTER: &str = "/api/v1/agent/register";
    pub const AGENT_HEARTBEAT: &str = "/api/v1/agent/heartbeat";
    pub const AGENT_TASKS: &str = "/api/v1/agent/tasks";
    pub const AGENT_TASK_RESULTS: &str = "/api/v1/agent/tasks/results";
    pub const API_V1_AGENTS: &str = "/api/v1/agents";
    pub const API_V1_WORKFLOWS: &str = "/api/v1/workflows";
}
