//! Deployment target adapters.
//!
//! Each adapter turns an [`ImageReference`](gantry_core::ImageReference) and a
//! [`ServiceSpec`](gantry_core::ServiceSpec) into a
//! [`DeploymentOperation`](crate::operation::DeploymentOperation):
//!
//! - [`CloudRunTarget`]: replace the container of an existing Cloud Run service
//! - [`ProvisionTarget`]: reconcile the service and its backing resources
//! - [`InstanceTarget`]: rewrite a VM's container declaration

pub mod cloud_run;
pub mod instance;
pub mod provision;

pub use cloud_run::{CloudRunTarget, service_body};
pub use instance::{CONTAINER_DECLARATION_KEY, InstanceTarget, container_declaration};
pub use provision::{
    Action, Change, Plan, ProvisionSettings, ProvisionTarget, Resource, ResourceGraph,
    ResourceKind,
};

use serde_json::Value;

use crate::api::ApiError;
use crate::operation::WaitError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The platform refused the request; `source` keeps its error body intact.
    #[error("{target} rejected the update to {resource}")]
    Rejected {
        target: &'static str,
        resource: String,
        source: ApiError,
    },

    #[error("unexpected response for {resource}: {detail}")]
    UnexpectedResponse { resource: String, detail: String },

    #[error("{resource} cannot be changed in place: {detail}")]
    Immutable { resource: String, detail: String },

    /// A resource another change depends on did not finish.
    #[error("waiting for {resource} failed")]
    Dependency { resource: String, source: WaitError },
}

impl DeployError {
    pub(crate) fn unexpected(resource: &str, body: &Value) -> Self {
        DeployError::UnexpectedResponse {
            resource: resource.to_owned(),
            detail: body.to_string(),
        }
    }
}
