//! # Plexus Kernel Runtime
//!
//! Command-line entry point.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging from the environment
//! 2. Load configuration (file, then environment-derived defaults)
//! 3. Load the requested plugins
//! 4. Start headless, on a port, or as a cluster
//! 5. Run until Ctrl+C, then shut down

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Instrument, Span};

use kernel_runtime::supervisor::worker_slot_from_env;
use kernel_runtime::{ClusterOptions, ClusterRole, KernelBuilder, RawConfig, StartMode};
use kernel_telemetry::{init_telemetry, TelemetryConfig};

/// Plexus Kernel: a plugin-assembled service process
#[derive(Parser, Debug)]
#[command(name = "kernel-runtime")]
#[command(about = "Assemble plugins into a running service")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "KERNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Supervise one worker process per CPU (bounded by limitWorkers)
    #[arg(long)]
    cluster: bool,

    /// Plugin to load from the built-in catalog (repeatable)
    #[arg(short, long = "plugin")]
    plugins: Vec<String>,

    /// "app" for headless mode, a port number, or nothing for the
    /// configured port
    #[arg(default_value = "")]
    mode: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let worker_slot = worker_slot_from_env();

    let mut telemetry = TelemetryConfig::from_env();
    if let Some(slot) = worker_slot {
        telemetry = telemetry.for_worker(slot);
    }
    init_telemetry(&telemetry).context("Failed to initialize logging")?;
    info!(service = %telemetry.service_name, "Logging initialized");

    let span = match worker_slot {
        Some(slot) => kernel_telemetry::worker_span!(slot),
        None => Span::none(),
    };
    run(args).instrument(span).await
}

async fn run(args: Args) -> Result<()> {
    let raw = match &args.config {
        Some(path) => RawConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RawConfig::new(),
    };
    let mode = StartMode::parse(&args.mode)?;

    let mut builder = KernelBuilder::new(raw).context("Invalid configuration")?;
    for plugin in &args.plugins {
        builder
            .use_plugin(plugin.as_str())
            .with_context(|| format!("Failed to load plugin '{plugin}'"))?;
    }

    if args.cluster {
        let options = ClusterOptions::from_env();
        match builder.start_cluster(mode, options).await? {
            ClusterRole::Coordinator(coordinator) => coordinator.run_until_signal().await?,
            ClusterRole::Worker(kernel) => kernel.run_until_signal().await?,
        }
    } else {
        builder.start(mode).await?.run_until_signal().await?;
    }

    Ok(())
}
