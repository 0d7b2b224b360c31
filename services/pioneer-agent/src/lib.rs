//! # Pioneer Agent
//!
//! Runs on a managed host: registers with the controller, keeps a heartbeat
//! going and long-polls for shell commands to execute.

pub mod client;
pub mod config;
pub mod executor;
pub mod heartbeat;
pub mod poller;
pub mod sysinfo;

pub use client::{ControllerApi, HttpControllerClient};
pub use config::{AgentArgs, AgentConfig};
pub use executor::{CommandExecutor, DEFAULT_EXEC_TIMEOUT, MAX_OUTPUT_BYTES};
pub use poller::Poller;
