//! # Pioneer Platform
//!
//! Controller service: agents register, heartbeat and long-poll for tasks
//! here; operators start workflows here.

pub mod api;
pub mod config;
pub mod state;
pub mod sweep;

pub use config::PlatformConfig;
pub use state::PlatformState;
