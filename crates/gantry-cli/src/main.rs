mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gantry_core::DeployMode;

#[derive(Parser)]
#[command(name = "gantry", about = "Build, publish and deploy a Rust service to Google Cloud")]
#[command(version)]
struct Cli {
    /// Project directory containing gantry.toml and the sources
    #[arg(long, short = 'C', global = true, default_value = ".")]
    project_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, publish and deploy, then print the public URL
    Deploy {
        /// Override [deploy].mode (cloud-run, provision or instance)
        #[arg(long)]
        mode: Option<DeployMode>,
    },
    /// Show what provisioning would create or update, without applying it
    Plan {
        /// Digest-qualified image reference to plan with
        #[arg(long)]
        image: String,
    },
    /// Check gcloud, docker and GCP project readiness
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::Deploy { mode } => commands::deploy(&cli.project_dir, mode).await?,
        Commands::Plan { image } => commands::plan(&cli.project_dir, &image).await?,
        Commands::Doctor => commands::doctor(&cli.project_dir).await?,
    }

    Ok(())
}
