use crate::client::ControllerApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sends one heartbeat immediately, then one per `interval` until shutdown.
pub fn spawn(
    client: Arc<dyn ControllerApi>,
    agent_id: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval = ?interval, "Heartbeat service started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match client.heartbeat(&agent_id).await {
                        Ok(()) => debug!("Heartbeat sent"),
                        Err(e) => warn!(error = %e, "Failed to send heartbeat"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Heartbeat service stopped");
    })
}
