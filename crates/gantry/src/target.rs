use std::time::Duration;

use gantry_cloud::{
    ApiTransport, CloudRunTarget, DeployError, DeploymentOperation, InstanceTarget,
    ProvisionTarget,
};
use gantry_core::{DeployMode, ImageReference, PipelineConfig, ServiceSpec};

use crate::stages::DeployTarget;

/// The deployment target chosen by `deploy.mode`, fixed for the whole run.
#[derive(Debug, Clone)]
pub enum Target<T: ApiTransport> {
    CloudRun(CloudRunTarget<T>),
    Provision(ProvisionTarget<T>),
    Instance(InstanceTarget<T>),
}

impl<T: ApiTransport> Target<T> {
    pub fn select(config: &PipelineConfig, transport: T) -> gantry_core::Result<Self> {
        let target = match config.deploy.mode {
            DeployMode::CloudRun => Target::CloudRun(CloudRunTarget::new(transport)),
            DeployMode::Provision => {
                Target::Provision(ProvisionTarget::from_config(config, transport)?)
            }
            DeployMode::Instance => {
                let zone = config.deploy.instance.zone.clone().ok_or(
                    gantry_core::Error::MissingSetting {
                        key: "deploy.instance.zone",
                        mode: DeployMode::Instance.as_str(),
                    },
                )?;
                let target = InstanceTarget::new(transport, zone, config.instance_name());
                if config.deploy.instance.restart {
                    let interval = Duration::from_secs(config.deploy.poll_interval_secs);
                    Target::Instance(target.with_restart(interval))
                } else {
                    Target::Instance(target)
                }
            }
        };
        tracing::debug!(mode = %config.deploy.mode, "deployment target selected");
        Ok(target)
    }

    pub fn mode(&self) -> DeployMode {
        match self {
            Target::CloudRun(_) => DeployMode::CloudRun,
            Target::Provision(_) => DeployMode::Provision,
            Target::Instance(_) => DeployMode::Instance,
        }
    }
}

impl<T: ApiTransport> DeployTarget for Target<T> {
    async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        match self {
            Target::CloudRun(target) => target.apply(image, spec).await,
            Target::Provision(target) => target.apply(image, spec).await,
            Target::Instance(target) => target.apply(image, spec).await,
        }
    }
}
