use std::path::Path;

use gantry_cloud::{HttpTransport, ProvisionTarget};
use gantry_core::{DeployMode, ImageReference, ServiceSpec};

/// Print the provisioning diff for `image` without applying it.
pub async fn plan(project_dir: &Path, image: &str) -> anyhow::Result<()> {
    let image = ImageReference::parse(image)?;

    let mut raw = super::load_config(project_dir)?;
    raw.deploy.mode = DeployMode::Provision;
    let config = raw.validate()?;

    let target = ProvisionTarget::from_config(&config, HttpTransport::new())?;
    let plan = target.plan(&image, &ServiceSpec::from_config(&config)).await?;

    println!("{plan}");
    Ok(())
}
