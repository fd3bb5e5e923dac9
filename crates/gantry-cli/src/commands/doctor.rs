use std::path::Path;

use gantry_cloud::{CheckResult, DockerClient, GcloudClient};
use gantry_core::{CONFIG_FILE, Parameter};

pub async fn doctor(project_dir: &Path) -> anyhow::Result<()> {
    let raw = super::load_config(project_dir);
    let (project_id, mode) = match &raw {
        Ok(raw) => (raw.parameters.get(Parameter::ProjectId), raw.deploy.mode),
        Err(_) => (None, Default::default()),
    };

    let client = GcloudClient::new();
    let mut report = client.doctor(project_id, mode).await;

    report.docker = match DockerClient::new(false).version().await {
        Ok(version) => CheckResult::ok(&version),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    report.config_file = match &raw {
        Ok(_) if project_dir.join(CONFIG_FILE).exists() => CheckResult::ok("Found"),
        Ok(_) => CheckResult::fail("Not found"),
        Err(e) => CheckResult::fail(&e.to_string()),
    };

    println!();
    println!("Deploy mode: {mode}");
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed, see above for details");
    }

    Ok(())
}
