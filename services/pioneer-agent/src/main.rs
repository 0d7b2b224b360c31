use anyhow::Context;
use clap::Parser;
use pioneer_agent::{
    heartbeat, sysinfo, AgentArgs, AgentConfig, CommandExecutor, ControllerApi,
    HttpControllerClient, Poller,
};
use pioneer_core::BUILD_INFO;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pioneer_agent=info")),
        )
        .init();

    let args = AgentArgs::parse();
    info!("Starting Pioneer Agent {}", BUILD_INFO);

    let config_dir = args.config_dir();
    let mut config = AgentConfig::load(&config_dir)
        .with_context(|| format!("loading agent config from {}", config_dir.display()))?;
    if let Some(url) = &args.backend_url {
        config.backend_url = url.clone();
    }

    let client: Arc<dyn ControllerApi> = Arc::new(HttpControllerClient::new(&config.backend_url)?);

    let agent_id = match config.agent_id.clone() {
        Some(id) => {
            info!(agent_id = %id, "Agent already registered");
            id
        }
        None => {
            info!(backend_url = %config.backend_url, "Agent not registered, registering");
            let hostname = sysinfo::hostname();
            let ip_address = sysinfo::primary_ip();
            let os = sysinfo::os_description();
            let id = client
                .register(&hostname, &ip_address, &os)
                .await
                .context("registering with controller")?;
            config.agent_id = Some(id.clone());
            config
                .save(&config_dir)
                .with_context(|| format!("saving agent config to {}", config_dir.display()))?;
            info!(agent_id = %id, %hostname, %ip_address, "Agent registered");
            id
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let heartbeat = heartbeat::spawn(
        client.clone(),
        agent_id.clone(),
        args.heartbeat_interval(),
        shutdown_rx.clone(),
    );
    let poller = Poller::new(client, CommandExecutor::new(args.exec_timeout()), agent_id)
        .with_backoff(args.retry_backoff());
    let polling = tokio::spawn(poller.run(shutdown_rx));

    info!("Agent is running");
    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = heartbeat.await {
        warn!(error = %e, "Heartbeat service ended abnormally");
    }
    polling.await.context("task poller panicked")?;
    info!("Pioneer Agent stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, exiting gracefully");
}
