mod cli;
mod config;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use argus_watcher::Watcher;
use clap::Parser;
use cli::{Cli, Commands, ConfigArgs, StartArgs, ValidateArgs};
use config::DaemonConfig;

const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Start(args) => start_daemon(args).await,
        Commands::Validate(args) => validate_config(args),
        Commands::Config(args) => generate_config(args),
    }
}

async fn start_daemon(args: StartArgs) -> Result<()> {
    let daemon_config = if args.config.exists() {
        DaemonConfig::load(&args.config)?
    } else {
        DaemonConfig::default()
    };

    telemetry::init_tracing(&daemon_config.logging, args.debug)?;

    if !args.config.exists() {
        tracing::warn!(path = %args.config.display(), "config file not found, using defaults");
    }

    if daemon_config.metrics.enabled {
        telemetry::init_metrics(daemon_config.metrics.port)?;
    }

    let watcher_config = daemon_config.to_watcher_config()?;
    let watcher = Arc::new(Watcher::new(watcher_config).context("constructing watcher")?);

    for path in &daemon_config.watch {
        let path_str = path.to_string_lossy().into_owned();
        watcher
            .watch(&path_str, move |event| {
                tracing::info!(
                    path = %event.path,
                    create = event.is_create,
                    delete = event.is_delete,
                    modify = event.is_modify,
                    "file change detected"
                );
            })
            .await
            .with_context(|| format!("registering watch for {}", path.display()))?;
    }

    watcher.start().await.context("starting watcher")?;
    tracing::info!(watched = watcher.watched_files(), "argus daemon running");

    shutdown_signal().await;
    tracing::info!("shutdown signal received, tearing down");

    match watcher.graceful_shutdown(SHUTDOWN_BUDGET).await {
        Ok(()) => tracing::info!("shutdown complete"),
        Err(e) => tracing::warn!(error = %e, "graceful shutdown timed out, teardown continues in background"),
    }

    Ok(())
}

fn validate_config(args: ValidateArgs) -> Result<()> {
    let daemon_config = DaemonConfig::load(&args.config)?;
    match daemon_config.to_watcher_config() {
        Ok(_) => {
            println!("{} is valid", args.config.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("{} is invalid: {e}", args.config.display());
            bail!("configuration validation failed");
        }
    }
}

fn generate_config(args: ConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{} already exists; pass --force to overwrite",
            args.output.display()
        );
    }
    let default_config = DaemonConfig::default();
    let serialized = toml::to_string_pretty(&default_config).context("serializing default config")?;
    std::fs::write(&args.output, serialized)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!("wrote default config to {}", args.output.display());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
