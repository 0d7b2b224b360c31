//! Agent configuration: command-line flags plus the persisted identity file.

use clap::Parser;
use pioneer_core::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "agent_config.json";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

#[derive(Parser, Debug, Clone)]
#[command(name = "pioneer-agent")]
#[command(about = "Pioneer Agent - executes controller-dispatched commands")]
#[command(version = pioneer_core::VERSION)]
pub struct AgentArgs {
    /// Controller base URL; overrides the persisted value
    #[arg(long, env = "PIONEER_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Directory holding agent_config.json (defaults to ~/.pioneer)
    #[arg(long, env = "PIONEER_AGENT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[arg(long, env = "PIONEER_HEARTBEAT_INTERVAL_SECS", default_value_t = 60)]
    pub heartbeat_interval_secs: u64,

    /// Pause after a failed task poll
    #[arg(long, env = "PIONEER_RETRY_BACKOFF_SECS", default_value_t = 10)]
    pub retry_backoff_secs: u64,

    /// Hard deadline for a single command
    #[arg(long, env = "PIONEER_EXEC_TIMEOUT_SECS", default_value_t = 60)]
    pub exec_timeout_secs: u64,
}

impl AgentArgs {
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pioneer")
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs.max(1))
    }
}

/// Persisted between runs so a restarted agent keeps its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub backend_url: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            agent_id: None,
        }
    }
}

impl AgentConfig {
    /// A missing file yields the defaults; an unreadable or malformed one is an error.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(path = %path.display(), "Loaded agent config");
                Ok(serde_json::from_str(&raw)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), raw)?;
        Ok(())
    }
}
