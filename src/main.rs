use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::ServeParams;

#[derive(Parser)]
#[command(
    name = "edgepool",
    version,
    about = "Coordinator for a pool of intermittently-connected edge compute nodes",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coordinator
    Serve {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to bind the HTTP API to
        #[arg(long)]
        host: Option<IpAddr>,

        /// HTTP port (API and /ws)
        #[arg(short, long)]
        port: Option<u16>,

        /// Also accept workers on a dedicated port
        #[arg(long)]
        worker_port: Option<u16>,

        /// Queue the demo tasks at startup
        #[arg(long, default_value = "false")]
        seed_sample_tasks: bool,

        /// Hand new tasks straight to an idle capable node
        #[arg(long, default_value = "false")]
        push_on_submit: bool,
    },

    /// Validate and print the resolved configuration
    CheckConfig {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let params = match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            worker_port,
            seed_sample_tasks,
            push_on_submit,
        } => ServeParams {
            config,
            host,
            port,
            worker_port,
            seed_sample_tasks,
            push_on_submit,
        },
        Commands::CheckConfig { config } => {
            return commands::check_config(&ServeParams {
                config,
                ..Default::default()
            });
        }
    };

    let config = commands::resolve_config(&params)?;
    let log_format = cli
        .log_format
        .as_deref()
        .unwrap_or(config.logging.format.as_str());
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    tracing::info!(
        bind_address = %config.coordinator.bind_address,
        worker_bind_address = ?config.coordinator.worker_bind_address,
        push_on_submit = %config.coordinator.push_on_submit,
        "edgepool coordinator starting"
    );

    commands::serve(config).await?;

    tracing::info!("edgepool stopped");
    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("edgepool=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("edgepool={level},warn"))
        })
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}
