use anyhow::Context;
use clap::Parser;
use pioneer_core::{FileKnowledgeBase, MemoryRegistry, Registry, BUILD_INFO};
use pioneer_platform::{api, sweep, PlatformConfig, PlatformState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_DIRECTIVE: &str =
    "pioneer_platform=info,workflow_engine=info,task_queue=info,pioneer_core=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE)),
        )
        .init();

    let config = PlatformConfig::parse();
    info!("Starting Pioneer Platform {}", BUILD_INFO);

    let knowledge_base = match &config.kb_file {
        Some(path) => FileKnowledgeBase::load(path)
            .with_context(|| format!("loading knowledge base from {}", path.display()))?,
        None => {
            warn!("No knowledge base file configured; every workflow start will be rejected");
            FileKnowledgeBase::new()
        }
    };
    info!(items = knowledge_base.len(), "Knowledge base loaded");

    let registry: Arc<dyn Registry> = Arc::new(MemoryRegistry::new());
    let (state, processor) =
        PlatformState::build(&config, registry.clone(), Arc::new(knowledge_base));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = sweep::spawn(
        registry,
        config.heartbeat_timeout(),
        config.sweep_interval(),
        shutdown_rx,
    );

    let app = api::router(state);
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("Pioneer Platform listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining task results");
    let _ = shutdown_tx.send(true);
    processor.shutdown().await;
    sweeper.await?;
    info!("Pioneer Platform stopped");

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
    info!("Shutdown signal received");
}
