use gantry_build::ContextError;
use gantry_cloud::{BuildError, DeployError, PublishError, WaitError};

use crate::state::PipelineState;

/// Terminal error of a pipeline run, one variant per failure class.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error")]
    Config(#[from] gantry_core::Error),

    #[error("failed to snapshot the build context")]
    Context(#[from] ContextError),

    #[error("image build failed")]
    Build(#[from] BuildError),

    #[error("image publish failed")]
    Publish(#[from] PublishError),

    #[error("deployment failed")]
    Deploy(#[from] DeployError),

    #[error("deployment operation failed")]
    Operation(#[from] WaitError),

    #[error("pipeline already ran and ended in state {0}")]
    AlreadyRan(PipelineState),
}
