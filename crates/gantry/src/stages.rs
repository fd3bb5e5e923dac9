//! Seams between pipeline stages.
//!
//! Production code uses the `gantry-cloud` implementations below, tests use
//! mockall-generated mocks.

use gantry_build::{BuildContext, BuildRecipe};
use gantry_cloud::{
    ApiTransport, BuildError, CloudRunTarget, CommandExecutor, CompletionWaiter, DeployError,
    DeploymentOperation, DockerClient, InstanceTarget, ProvisionTarget, PublishError, WaitError,
};
use gantry_core::{ImageReference, LocalImage, ServiceSpec};

/// Turns a build context into a local image. Owns the context from here on.
#[allow(async_fn_in_trait)]
pub trait ImageBuilder {
    async fn build(
        &self,
        context: BuildContext,
        recipe: &BuildRecipe,
    ) -> Result<LocalImage, BuildError>;
}

/// Pushes a local image and returns its digest-qualified reference.
#[allow(async_fn_in_trait)]
pub trait RegistryPublisher {
    async fn publish(
        &self,
        image: &LocalImage,
        registry: &str,
    ) -> Result<ImageReference, PublishError>;
}

/// Applies the desired state to one kind of execution target.
#[allow(async_fn_in_trait)]
pub trait DeployTarget {
    async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError>;
}

/// Blocks until a deployment operation resolves and yields the public URL.
#[allow(async_fn_in_trait)]
pub trait OperationWaiter {
    async fn wait(&self, operation: &DeploymentOperation) -> Result<String, WaitError>;
}

impl<D: CommandExecutor, G: CommandExecutor> ImageBuilder for DockerClient<D, G> {
    async fn build(
        &self,
        context: BuildContext,
        recipe: &BuildRecipe,
    ) -> Result<LocalImage, BuildError> {
        DockerClient::build(self, context, recipe).await
    }
}

impl<D: CommandExecutor, G: CommandExecutor> RegistryPublisher for DockerClient<D, G> {
    async fn publish(
        &self,
        image: &LocalImage,
        registry: &str,
    ) -> Result<ImageReference, PublishError> {
        DockerClient::publish(self, image, registry).await
    }
}

impl<T: ApiTransport> DeployTarget for CloudRunTarget<T> {
    async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        CloudRunTarget::apply(self, image, spec).await
    }
}

impl<T: ApiTransport> DeployTarget for ProvisionTarget<T> {
    async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        ProvisionTarget::apply(self, image, spec).await
    }
}

impl<T: ApiTransport> DeployTarget for InstanceTarget<T> {
    async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        InstanceTarget::apply(self, image, spec).await
    }
}

impl<T: ApiTransport> OperationWaiter for CompletionWaiter<T> {
    async fn wait(&self, operation: &DeploymentOperation) -> Result<String, WaitError> {
        CompletionWaiter::wait(self, operation).await
    }
}
