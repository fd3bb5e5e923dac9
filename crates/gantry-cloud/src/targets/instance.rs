use std::fmt::Write as _;
use std::time::Duration;

use gantry_core::{ImageReference, ServiceSpec};
use serde_json::{Value, json};

use super::DeployError;
use crate::api::{ApiTransport, COMPUTE_API, Method};
use crate::operation::{
    DeploymentOperation, Endpoint, OperationHandle, OperationKind, await_operation,
};

/// Metadata key read by the container supervisor on Container-Optimized OS.
pub const CONTAINER_DECLARATION_KEY: &str = "gce-container-declaration";

/// Points a Compute Engine instance's container declaration at a new image.
///
/// A single VM has no scaling bounds, concurrency limit or ingress policy;
/// those fields of the [`ServiceSpec`] do not apply here. Other metadata
/// items on the instance are preserved.
///
/// Container-Optimized OS starts the declared container at boot only, so a
/// metadata update alone leaves the old image running. With
/// [`with_restart`](Self::with_restart) the instance is reset once the new
/// declaration is stored.
#[derive(Debug, Clone)]
pub struct InstanceTarget<T: ApiTransport> {
    transport: T,
    zone: String,
    instance: String,
    restart: Option<Duration>,
}

impl<T: ApiTransport> InstanceTarget<T> {
    pub fn new(transport: T, zone: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            transport,
            zone: zone.into(),
            instance: instance.into(),
            restart: None,
        }
    }

    /// Reset the VM after the metadata update, polling that update every
    /// `interval` first.
    pub fn with_restart(mut self, interval: Duration) -> Self {
        self.restart = Some(interval);
        self
    }

    pub fn restarts(&self) -> bool {
        self.restart.is_some()
    }

    fn instance_url(&self, spec: &ServiceSpec) -> String {
        format!(
            "{COMPUTE_API}/projects/{}/zones/{}/instances/{}",
            spec.project_id, self.zone, self.instance
        )
    }

    pub async fn apply(
        &self,
        image: &ImageReference,
        spec: &ServiceSpec,
    ) -> Result<DeploymentOperation, DeployError> {
        let instance_url = self.instance_url(spec);
        let rejected = |e| DeployError::Rejected {
            target: "Compute Engine",
            resource: instance_url.clone(),
            source: e,
        };

        let instance = self
            .transport
            .send(Method::GET, &instance_url, None)
            .await
            .map_err(rejected)?;

        let metadata = instance
            .get("metadata")
            .ok_or_else(|| DeployError::unexpected(&instance_url, &instance))?;
        let fingerprint = metadata
            .get("fingerprint")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployError::unexpected(&instance_url, metadata))?;

        let mut items: Vec<Value> = metadata
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let declaration = container_declaration(image, spec);
        let existing = items
            .iter()
            .position(|item| {
                item.get("key").and_then(Value::as_str) == Some(CONTAINER_DECLARATION_KEY)
            });
        match existing {
            Some(i) => items[i]["value"] = json!(declaration),
            None => items.push(json!({ "key": CONTAINER_DECLARATION_KEY, "value": declaration })),
        }

        tracing::info!(
            instance = %self.instance,
            zone = %self.zone,
            image = %image,
            "updating instance container declaration"
        );
        let response = self
            .transport
            .send(
                Method::POST,
                &format!("{instance_url}/setMetadata"),
                Some(json!({ "fingerprint": fingerprint, "items": items })),
            )
            .await
            .map_err(rejected)?;

        let mut handle = OperationHandle::from_self_link(OperationKind::Compute, &response)
            .map_err(|body| DeployError::unexpected(&instance_url, &body))?;

        if let Some(interval) = self.restart {
            await_operation(&self.transport, &handle, interval)
                .await
                .map_err(|e| DeployError::Dependency {
                    resource: instance_url.clone(),
                    source: e,
                })?;

            tracing::info!(instance = %self.instance, "resetting instance");
            let response = self
                .transport
                .send(Method::POST, &format!("{instance_url}/reset"), None)
                .await
                .map_err(rejected)?;
            handle = OperationHandle::from_self_link(OperationKind::Compute, &response)
                .map_err(|body| DeployError::unexpected(&instance_url, &body))?;
        }

        Ok(DeploymentOperation::Pending {
            operations: vec![handle],
            endpoint: Endpoint::Instance {
                instance_url,
                port: spec.port,
            },
        })
    }
}

/// YAML container declaration for `image`.
///
/// Scalars are written as JSON strings, which YAML reads as double-quoted.
pub fn container_declaration(image: &ImageReference, spec: &ServiceSpec) -> String {
    let quote = |s: &str| Value::from(s).to_string();

    let mut out = String::from("spec:\n  containers:\n");
    let _ = writeln!(out, "  - name: {}", quote(&spec.service_name));
    let _ = writeln!(out, "    image: {}", quote(image.as_str()));
    if !spec.env.is_empty() {
        out.push_str("    env:\n");
        for var in &spec.env {
            let _ = writeln!(out, "    - name: {}", quote(&var.name));
            let _ = writeln!(out, "      value: {}", quote(&var.value));
        }
    }
    out.push_str("    stdin: false\n    tty: false\n");
    out.push_str("  restartPolicy: Always\n");
    out
}
