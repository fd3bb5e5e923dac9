use gantry_core::{ImageReference, ServiceSpec};
use serde_json::{Value, json};

use super::DeployError;
use crate::api::{ApiTransport, Method, RUN_API};
use crate::operation::{DeploymentOperation, Endpoint, OperationHandle};

/// Direct update of an existing Cloud Run service.
///
/// The Admin API v2 `UpdateService` call replaces the whole service, so the
/// body always carries the complete [`ServiceSpec`]; anything left out would
/// fall back to the platform default.
#[derive(Debug, Clone)]
pub struct CloudRunTarget<T: ApiTransport> {
    transport: T,
}

impl<T: ApiTransport> CloudRunTarget<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        let resource = spec.resource_name();
        tracing::info!(
            service = %resource,
            image = %image,
            max_instances = spec.max_instances,
            concurrency = spec.concurrency,
            "updating Cloud Run service"
        );

        let response = self
            .transport
            .send(
                Method::PATCH,
                &format!("{RUN_API}/{resource}"),
                Some(service_body(image, spec)),
            )
            .await
            .map_err(|e| DeployError::Rejected {
                target: "Cloud Run",
                resource: resource.clone(),
                source: e,
            })?;

        let handle = OperationHandle::from_run_response(&response)
            .map_err(|body| DeployError::unexpected(&resource, &body))?;

        Ok(DeploymentOperation::Pending {
            operations: vec![handle],
            endpoint: Endpoint::RunResponse,
        })
    }
}

/// Cloud Run Admin API v2 `Service` body for `spec` running `image`.
pub fn service_body(image: &ImageReference, spec: &ServiceSpec) -> Value {
    let env: Vec<Value> = spec
        .env
        .iter()
        .map(|e| json!({ "name": e.name, "value": e.value }))
        .collect();

    let mut template = json!({
        "maxInstanceRequestConcurrency": spec.concurrency,
        "scaling": {
            "minInstanceCount": spec.min_instances,
            "maxInstanceCount": spec.max_instances,
        },
        "containers": [{
            "image": image.as_str(),
            "ports": [{ "name": "http1", "containerPort": spec.port }],
            "resources": {
                "limits": { "cpu": spec.cpu, "memory": spec.memory },
            },
            "env": env,
        }],
    });
    if let Some(account) = &spec.service_account {
        template["serviceAccount"] = json!(account);
    }

    json!({
        "ingress": spec.ingress.api_value(),
        "template": template,
    })
}
