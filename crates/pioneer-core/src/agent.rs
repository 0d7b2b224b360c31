//! Agent types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type AgentId = String;

/// Liveness as seen by the controller.
///
/// Heartbeats move an agent to `Online`; the offline sweep moves it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Online => f.write_str("online"),
            AgentStatus::Offline => f.write_str("offline"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub hostname: String,
    pub ip_address: String,
    pub os: String,
    pub status: AgentStatus,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// A freshly registered agent starts offline until its first heartbeat.
    pub fn new(hostname: String, ip_address: String, os: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            hostname,
            ip_address,
            os,
            status: AgentStatus::Offline,
            last_seen: now,
            created_at: now,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }
}
