//! Offline sweep: agents that stop heartbeating go offline.

use chrono::Utc;
use pioneer_core::{Registry, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub async fn sweep_once(registry: &dyn Registry, heartbeat_timeout: Duration) -> Result<usize> {
    let Some(cutoff) = chrono::Duration::from_std(heartbeat_timeout)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
    else {
        return Ok(0);
    };
    let marked = registry.mark_stale_agents_offline(cutoff).await?;
    if marked > 0 {
        info!(marked, "Marked silent agents offline");
    }
    Ok(marked)
}

pub fn spawn(
    registry: Arc<dyn Registry>,
    heartbeat_timeout: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = sweep_once(registry.as_ref(), heartbeat_timeout).await {
                        error!(error = %e, "Offline sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!("Offline sweep stopping");
                    break;
                }
            }
        }
    })
}
