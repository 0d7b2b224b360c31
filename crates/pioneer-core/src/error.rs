//! Error types for the Pioneer platform

use crate::workflow::WorkflowStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PioneerError>;

#[derive(Error, Debug)]
pub enum PioneerError {
    #[error("Agent not found: {agent_id}")]
    AgentNotFound { agent_id: String },

    #[error("Agent is offline: {agent_id}")]
    AgentOffline { agent_id: String },

    #[error("Knowledge base item not found: {kb_id}")]
    KnowledgeBaseItemNotFound { kb_id: String },

    #[error("Knowledge base item {kb_id} has no diagnostic steps")]
    EmptyDiagnosticPlan { kb_id: String },

    #[error("Workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    #[error("Invalid workflow transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("Workflow {workflow_id} was modified concurrently")]
    WorkflowConflict { workflow_id: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Storage operation failed: {reason}")]
    Storage { reason: String },

    #[error("Task queue closed for agent: {agent_id}")]
    QueueClosed { agent_id: String },

    #[error("Result processor is shutting down")]
    ResultProcessorClosed,

    #[error("Agent communication failed: {reason}")]
    AgentCommunicationError { reason: String },

    #[error("Serialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}
