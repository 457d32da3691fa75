use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio::sync::watch;

use edgepool::config::Config;
use edgepool::coordinator::CoordinatorServer;
use edgepool::metrics;

/// Flags that override the loaded configuration
#[derive(Debug, Default)]
pub struct ServeParams {
    pub config: Option<PathBuf>,
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub worker_port: Option<u16>,
    pub seed_sample_tasks: bool,
    pub push_on_submit: bool,
}

/// Resolve file, environment and flags into one validated config
pub fn resolve_config(params: &ServeParams) -> Result<Config> {
    let mut config = Config::load(params.config.as_deref())?;
    let coordinator = &mut config.coordinator;

    if let Some(host) = params.host {
        coordinator.bind_address.set_ip(host);
    }
    if let Some(port) = params.port {
        coordinator.bind_address.set_port(port);
    }
    if let Some(port) = params.worker_port {
        let host = coordinator
            .worker_bind_address
            .map(|addr| addr.ip())
            .unwrap_or_else(|| coordinator.bind_address.ip());
        coordinator.worker_bind_address = Some(SocketAddr::new(host, port));
    }
    if params.seed_sample_tasks {
        coordinator.seed_sample_tasks = true;
    }
    if params.push_on_submit {
        coordinator.push_on_submit = true;
    }

    config.validate()?;
    Ok(config)
}

/// Start the coordinator and run until Ctrl+C
pub async fn serve(config: Config) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let server =
        CoordinatorServer::new(config.coordinator).context("Failed to create coordinator server")?;

    println!("{}", server.info().display());
    println!();
    println!("API Endpoints:");
    println!("  POST /submit_task     - Submit a task");
    println!("  GET  /task/{{task_id}}  - Get one task");
    println!("  GET  /tasks           - List tasks and the dispatch queue");
    println!("  GET  /status          - Nodes and task counts");
    println!("  GET  /ws              - Worker WebSocket endpoint");
    println!("  GET  /health          - Health check");
    println!("  GET  /metrics         - Prometheus metrics endpoint");
    println!();
    println!("Press Ctrl+C to stop.\n");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
            }
            Err(e) => {
                tracing::error!("Failed to wait for Ctrl+C: {}", e);
            }
        }
        let _ = shutdown_tx.send(true);
    });

    server
        .start_with_shutdown(shutdown_rx)
        .await
        .context("Coordinator server failed")?;

    println!("Coordinator server stopped.");
    Ok(())
}

/// Print the resolved configuration as TOML
pub fn check_config(params: &ServeParams) -> Result<()> {
    let config = resolve_config(params)?;
    let rendered = toml::to_string_pretty(&config).context("Failed to render config")?;
    println!("{rendered}");
    println!("# configuration is valid");
    Ok(())
}
