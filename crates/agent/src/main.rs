//! Metadata agent - pod metadata database for node-level telemetry
//!
//! This binary runs as a DaemonSet on each Kubernetes node, resolving
//! processes to their owner pods and IP addresses to cluster objects.

use anyhow::{Context, Result};
use metadb::{
    health::{components, HealthRegistry},
    Database, Inventory, MemoryInformer, ProcfsInspector, StructuredLogger,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting metadb-agent");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        proc_root = %config.proc_root,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all(components::ALL).await;

    let logger = StructuredLogger::new(&config.node_name);

    let informer = Arc::new(MemoryInformer::new());
    if !Path::new(&config.proc_root).is_dir() {
        health_registry
            .set_degraded(
                components::INSPECTOR,
                format!("{} is not a directory", config.proc_root),
            )
            .await;
    }
    let inspector = Arc::new(ProcfsInspector::new(&config.proc_root));

    let db = match Database::start(informer.clone(), inspector) {
        Ok(db) => {
            health_registry.record_database_start(Ok(())).await;
            db
        }
        Err(e) => {
            logger.log_registration_failure(&e);
            health_registry.record_database_start(Err(&e)).await;
            return Err(e.into());
        }
    };

    if let Some(path) = &config.inventory_path {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading inventory {}", path))?;
        let inventory = Inventory::from_json(&raw)
            .with_context(|| format!("parsing inventory {}", path))?;
        informer.load(inventory);

        let (pods, services, nodes) = informer.counts();
        logger.log_inventory_loaded(path, pods, services, nodes);
    }

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), db));
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    logger.log_startup(AGENT_VERSION);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
            api_handle.abort();
        }
        result = &mut api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server exited".to_string(),
                Ok(Err(e)) => format!("API server failed: {e}"),
                Err(e) => format!("API task panicked: {e}"),
            };
            error!(reason = %reason, "API server stopped");
            logger.log_shutdown(&reason);
            anyhow::bail!(reason);
        }
    }

    informer.stop();
    info!("Shutting down");

    Ok(())
}
