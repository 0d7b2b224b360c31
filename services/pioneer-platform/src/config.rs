//! Controller configuration

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "pioneer-platform")]
#[command(about = "Pioneer Platform - task dispatch and workflow orchestration")]
#[command(version = pioneer_core::VERSION)]
pub struct PlatformConfig {
    /// Address the HTTP API listens on
    #[arg(long, env = "PIONEER_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// JSON knowledge base document (`{"items": [...]}`)
    #[arg(long, env = "PIONEER_KB_FILE")]
    pub kb_file: Option<PathBuf>,

    /// Longest an agent's task poll is held open
    #[arg(long, env = "PIONEER_POLL_TIMEOUT_SECS", default_value_t = 30)]
    pub poll_timeout_secs: u64,

    /// Pending tasks per agent before submitters wait
    #[arg(long, env = "PIONEER_QUEUE_CAPACITY", default_value_t = task_queue::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Silence after which an online agent is marked offline
    #[arg(long, env = "PIONEER_HEARTBEAT_TIMEOUT_SECS", default_value_t = 300)]
    pub heartbeat_timeout_secs: u64,

    /// How often the offline sweep runs
    #[arg(long, env = "PIONEER_SWEEP_INTERVAL_SECS", default_value_t = 30)]
    pub sweep_interval_secs: u64,

    /// Task results buffered ahead of workflow processing
    #[arg(long, env = "PIONEER_RESULT_BUFFER", default_value_t = 256)]
    pub result_buffer: usize,

    /// Task results advanced concurrently
    #[arg(long, env = "PIONEER_RESULT_CONCURRENCY", default_value_t = 16)]
    pub result_concurrency: usize,
}

impl PlatformConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::parse_from(["pioneer-platform"])
    }
}
