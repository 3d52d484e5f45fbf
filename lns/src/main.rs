//! LNS Network Node
//!
//! Loads configuration, starts the packet forwarder if one is configured and
//! replays uplinks from stdin until EOF or Ctrl-C.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use lns::config::{load_configuration, CliArgs};
use lns::runtime::{NodeRuntime, PacketForwarderSupervisor};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = parse_cli_args();

    // Initialize logging before anything logs; RUST_LOG wins over both levels
    let rust_log = EnvFilter::try_from_default_env().ok();
    let from_env = rust_log.is_some();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(rust_log.unwrap_or_else(|| EnvFilter::new(args.startup_log_level())))
        .with_writer(std::io::stderr)
        .with_filter_reloading();
    let filter_handle = builder.reload_handle();
    builder.init();

    // Load and validate configuration
    let config = load_configuration(&args)
        .await
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    if !from_env {
        filter_handle
            .reload(EnvFilter::new(&config.log_level))
            .context("Failed to apply configured log level")?;
    }

    let mut supervisor = config.packet_forwarder.clone().map(PacketForwarderSupervisor::new);
    if let Some(supervisor) = supervisor.as_mut() {
        supervisor.start().await?;
    }

    let runtime = NodeRuntime::new(&config);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let outcome = tokio::select! {
        stats = runtime.replay(stdin, stdout) => stats.map(Some),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            Ok(None)
        }
    };

    if let Some(supervisor) = supervisor.as_mut() {
        supervisor.stop().await?;
    }

    if let Some(stats) = outcome? {
        tracing::info!(
            processed = stats.processed,
            accepted = stats.accepted,
            duplicates = stats.duplicates,
            dropped = stats.dropped,
            joins = stats.joins,
            errors = stats.errors,
            "Replay finished"
        );
    }
    Ok(())
}

/// Parse command-line arguments
fn parse_cli_args() -> CliArgs {
    let args: Vec<String> = env::args().collect();

    let mut config = PathBuf::from("lns/configs/node.toml");
    let mut gateway_id = None;
    let mut log_level = None;

    // Simple argument parser
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config = PathBuf::from(&args[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--gateway-id" => {
                if i + 1 < args.len() {
                    gateway_id = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--log-level" => {
                if i + 1 < args.len() {
                    log_level = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    CliArgs {
        config,
        gateway_id,
        log_level,
    }
}
