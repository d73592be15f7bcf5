//! kubeonoff - switch deployments on and off
//!
//! Runs inside the cluster next to the workloads it manages and exposes a
//! small HTTP API to list, stop, start and restart them.

use anyhow::Result;
use clap::Parser;
use kubeonoff::config::ServiceConfig;
use onoff_lib::extensions::ExtensionFactories;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kubeonoff", version, about = "Switch Kubernetes deployments on and off")]
struct Args {
    /// Log filter, e.g. `info` or `kubeonoff=debug` (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(fmt::layer().json())
        .init();

    let config = ServiceConfig::load()?;
    kubeonoff::run(config, ExtensionFactories::new()).await
}
