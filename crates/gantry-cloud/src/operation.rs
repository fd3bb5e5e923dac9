//! Asynchronous platform operations and the completion waiter.

use std::time::Duration;

use serde_json::Value;

use crate::api::{ApiError, ApiTransport, Method, RUN_API};

/// Operation flavours, by how completion and failure are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Cloud Run Admin API long-running operation: `done` + `error` / `response`.
    CloudRun,
    /// Compute Engine operation: `status: DONE` + `error.errors[]`.
    Compute,
    /// Cloud SQL Admin operation, same shape as Compute.
    SqlAdmin,
}

impl OperationKind {
    fn progress(self, operation: &Value) -> Progress {
        match self {
            OperationKind::CloudRun => {
                if !operation.get("done").and_then(Value::as_bool).unwrap_or(false) {
                    return Progress::Pending;
                }
                match operation.get("error") {
                    Some(error) if !error.is_null() => {
                        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
                        let message = error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("operation failed");
                        Progress::Failed(format!("code {code}: {message}"))
                    }
                    _ => Progress::Done,
                }
            }
            OperationKind::Compute | OperationKind::SqlAdmin => {
                if operation.get("status").and_then(Value::as_str) != Some("DONE") {
                    return Progress::Pending;
                }
                let errors: Vec<String> = operation
                    .pointer("/error/errors")
                    .and_then(Value::as_array)
                    .map(|errors| {
                        errors
                            .iter()
                            .map(|e| {
                                format!(
                                    "{}: {}",
                                    e.get("code").and_then(Value::as_str).unwrap_or("ERROR"),
                                    e.get("message").and_then(Value::as_str).unwrap_or("")
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                if errors.is_empty() {
                    Progress::Done
                } else {
                    Progress::Failed(errors.join("; "))
                }
            }
        }
    }
}

enum Progress {
    Pending,
    Done,
    Failed(String),
}

/// Handle to an in-flight platform operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    pub kind: OperationKind,
    pub name: String,
    /// URL that returns the operation's current state on GET.
    pub poll_url: String,
}

impl OperationHandle {
    /// Handle from a Cloud Run Admin API operation body.
    pub fn from_run_response(response: &Value) -> Result<Self, Value> {
        let name = response
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| response.clone())?;
        Ok(Self {
            kind: OperationKind::CloudRun,
            name: name.to_owned(),
            poll_url: format!("{RUN_API}/{name}"),
        })
    }

    /// Handle from a Compute Engine or Cloud SQL operation body.
    pub fn from_self_link(kind: OperationKind, response: &Value) -> Result<Self, Value> {
        let name = response.get("name").and_then(Value::as_str);
        let link = response.get("selfLink").and_then(Value::as_str);
        match (name, link) {
            (Some(name), Some(link)) => Ok(Self {
                kind,
                name: name.to_owned(),
                poll_url: link.to_owned(),
            }),
            _ => Err(response.clone()),
        }
    }
}

/// Where the public URL comes from once all operations are done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `response.uri` of the last Cloud Run operation.
    RunResponse,
    /// External IP of a Compute Engine instance.
    Instance { instance_url: String, port: u16 },
    /// Already known when the operation was issued.
    Known(String),
}

/// What a target adapter hands back after applying the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOperation {
    /// Nothing left to wait for.
    Resolved { url: String },
    /// Operations to await in order; the first failure is terminal.
    Pending {
        operations: Vec<OperationHandle>,
        endpoint: Endpoint,
    },
}

/// Poll `handle` until the platform reports it finished.
///
/// Returns the final operation body. No timeout is applied.
pub async fn await_operation<T: ApiTransport>(
    transport: &T,
    handle: &OperationHandle,
    interval: Duration,
) -> Result<Value, WaitError> {
    loop {
        let state = transport
            .send(Method::GET, &handle.poll_url, None)
            .await
            .map_err(|e| WaitError::Poll {
                operation: handle.name.clone(),
                source: e,
            })?;

        match handle.kind.progress(&state) {
            Progress::Done => {
                tracing::debug!(operation = %handle.name, "operation done");
                return Ok(state);
            }
            Progress::Failed(detail) => {
                return Err(WaitError::Failed {
                    operation: handle.name.clone(),
                    detail,
                });
            }
            Progress::Pending => {
                tracing::debug!(operation = %handle.name, "operation pending");
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Blocks on a [`DeploymentOperation`] and extracts the public URL.
#[derive(Debug, Clone)]
pub struct CompletionWaiter<T: ApiTransport> {
    transport: T,
    interval: Duration,
}

impl<T: ApiTransport> CompletionWaiter<T> {
    pub fn new(transport: T, interval: Duration) -> Self {
        Self {
            transport,
            interval,
        }
    }

    pub async fn wait(&self, operation: &DeploymentOperation) -> Result<String, WaitError> {
        let (operations, endpoint) = match operation {
            DeploymentOperation::Resolved { url } => return Ok(url.clone()),
            DeploymentOperation::Pending {
                operations,
                endpoint,
            } => (operations, endpoint),
        };

        let mut run_response = None;
        for handle in operations {
            tracing::info!(operation = %handle.name, kind = ?handle.kind, "waiting for operation");
            let done = await_operation(&self.transport, handle, self.interval).await?;
            if handle.kind == OperationKind::CloudRun {
                run_response = done.get("response").cloned();
            }
        }

        match endpoint {
            Endpoint::Known(url) => Ok(url.clone()),
            Endpoint::RunResponse => run_response
                .as_ref()
                .and_then(|r| r.get("uri"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .ok_or_else(|| WaitError::NoEndpoint {
                    detail: "operation response carries no service uri".to_owned(),
                }),
            Endpoint::Instance { instance_url, port } => {
                self.instance_endpoint(instance_url, *port).await
            }
        }
    }

    async fn instance_endpoint(&self, instance_url: &str, port: u16) -> Result<String, WaitError> {
        let instance = self
            .transport
            .send(Method::GET, instance_url, None)
            .await
            .map_err(|e| WaitError::Poll {
                operation: instance_url.to_owned(),
                source: e,
            })?;

        let ip = instance
            .get("networkInterfaces")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|nic| nic.get("accessConfigs").and_then(Value::as_array))
            .flatten()
            .find_map(|ac| ac.get("natIP").and_then(Value::as_str))
            .ok_or_else(|| WaitError::NoEndpoint {
                detail: format!("instance {instance_url} has no external IP"),
            })?;

        Ok(if port == 80 {
            format!("http://{ip}")
        } else {
            format!("http://{ip}:{port}")
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("operation {operation} failed: {detail}")]
    Failed { operation: String, detail: String },

    #[error("failed to poll operation {operation}")]
    Poll { operation: String, source: ApiError },

    #[error("deployment finished but no endpoint was found: {detail}")]
    NoEndpoint { detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_operation_progress() {
        let kind = OperationKind::CloudRun;
        assert!(matches!(kind.progress(&json!({"name": "op"})), Progress::Pending));
        assert!(matches!(kind.progress(&json!({"done": true})), Progress::Done));
        let failed = json!({"done": true, "error": {"code": 9, "message": "revision failed"}});
        match kind.progress(&failed) {
            Progress::Failed(detail) => assert_eq!(detail, "code 9: revision failed"),
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn compute_operation_progress() {
        let kind = OperationKind::Compute;
        assert!(matches!(kind.progress(&json!({"status": "RUNNING"})), Progress::Pending));
        assert!(matches!(kind.progress(&json!({"status": "DONE"})), Progress::Done));
        let failed = json!({
            "status": "DONE",
            "error": {"errors": [{"code": "CONDITION_NOT_MET", "message": "fingerprint mismatch"}]}
        });
        match kind.progress(&failed) {
            Progress::Failed(detail) => {
                assert_eq!(detail, "CONDITION_NOT_MET: fingerprint mismatch")
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn run_handle_poll_url() {
        let handle = OperationHandle::from_run_response(&json!({
            "name": "projects/p/locations/us-central1/operations/abc"
        }))
        .unwrap();
        assert_eq!(
            handle.poll_url,
            "https://run.googleapis.com/v2/projects/p/locations/us-central1/operations/abc"
        );
    }

    #[test]
    fn self_link_handle_requires_link() {
        let body = json!({"name": "op"});
        assert!(OperationHandle::from_self_link(OperationKind::Compute, &body).is_err());
    }
}
