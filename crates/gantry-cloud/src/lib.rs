pub mod api;
pub mod client;
pub mod command;
pub mod docker;
pub mod executor;
pub mod operation;
pub mod targets;

pub use api::{ApiError, ApiTransport, HttpTransport};
pub use client::{ApiCheck, CheckResult, DoctorReport, GcloudClient, required_apis};
pub use command::CommandError;
pub use docker::{BuildError, DockerClient, PublishError};
pub use executor::{CommandExecutor, RealExecutor};
pub use operation::{
    CompletionWaiter, DeploymentOperation, Endpoint, OperationHandle, OperationKind, WaitError,
    await_operation,
};
pub use targets::{CloudRunTarget, DeployError, InstanceTarget, ProvisionTarget};
