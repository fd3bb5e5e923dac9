use std::path::Path;
use std::time::Duration;

use gantry::{Pipeline, Target};
use gantry_cloud::{CompletionWaiter, DockerClient, HttpTransport};
use gantry_core::DeployMode;

/// Run the full pipeline: validate → build → publish → deploy → wait.
pub async fn deploy(project_dir: &Path, mode: Option<DeployMode>) -> anyhow::Result<()> {
    let mut raw = super::load_config(project_dir)?;
    if let Some(mode) = mode {
        raw.deploy.mode = mode;
    }

    let docker = DockerClient::new(raw.deploy.registry_login);
    let transport = HttpTransport::new();
    let waiter = CompletionWaiter::new(
        transport.clone(),
        Duration::from_secs(raw.deploy.poll_interval_secs),
    );

    println!("Deploying ({})...", raw.deploy.mode);
    let mut pipeline = Pipeline::new(project_dir, docker.clone(), docker, waiter);
    let outcome = pipeline
        .run(raw, |config| Target::select(config, transport))
        .await?;

    println!();
    println!("Image:    {}", outcome.image);
    println!("Deployed: {}", outcome.url);

    Ok(())
}
