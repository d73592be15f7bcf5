//! onoffctl: command line client for the kubeonoff service
//!
//! Shows what runs in the namespace, stops and starts deployments, restarts
//! them and deletes pods, all through the service's HTTP API.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{deployments, extensions, pods};

#[derive(Parser, Debug)]
#[command(name = "onoffctl")]
#[command(author, version, about = "Turn Kubernetes deployments on and off", long_about = None)]
pub struct Cli {
    /// kubeonoff service URL (can also be set via KUBEONOFF_API_URL env var)
    #[arg(long, env = "KUBEONOFF_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Show deployments and pods with their utilization
    Status,

    /// Scale a deployment to zero, remembering its replica count
    Off {
        /// Deployment name
        name: String,
    },

    /// Bring a deployment stopped with `off` back to its replica count
    On {
        /// Deployment name
        name: String,
    },

    /// Restart a deployment
    Restart {
        /// Deployment name
        name: String,

        /// Delete all pods at once instead of rolling
        #[arg(long)]
        hard: bool,
    },

    /// Delete a single pod
    DeletePod {
        /// Pod name
        name: String,
    },

    /// Delete every pod in the namespace except the service's own
    DeleteAllPods,

    /// Print the last lines of a container's log
    Logs {
        /// Pod name
        pod: String,

        /// Container name
        container: String,

        /// Prefix each line with its timestamp
        #[arg(long)]
        timestamps: bool,
    },

    /// List the extensions loaded by the service
    Extensions,
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.resolve_format(cli.format);
    let client = client::ApiClient::new(&config.resolve_api_url(cli.api_url))?;

    match cli.command {
        Commands::Status => deployments::show_status(&client, format).await?,
        Commands::Off { name } => deployments::run_action(&client, &name, "off", format).await?,
        Commands::On { name } => deployments::run_action(&client, &name, "on", format).await?,
        Commands::Restart { name, hard: false } => {
            deployments::run_action(&client, &name, "restart", format).await?
        }
        Commands::Restart { name, hard: true } => {
            deployments::hard_restart(&client, &name, format).await?
        }
        Commands::DeletePod { name } => pods::delete_pod(&client, &name, format).await?,
        Commands::DeleteAllPods => pods::delete_all_pods(&client, format).await?,
        Commands::Logs {
            pod,
            container,
            timestamps,
        } => pods::show_logs(&client, &pod, &container, timestamps).await?,
        Commands::Extensions => extensions::list_extensions(&client, format).await?,
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        output::print_error(&format!("{:#}", err));
        std::process::exit(1);
    }
}
