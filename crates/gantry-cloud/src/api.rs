//! JSON-over-HTTPS access to Google Cloud REST APIs.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::client::GcloudClient;
use crate::command::CommandError;
use crate::executor::{CommandExecutor, RealExecutor};

pub use reqwest::Method;

pub const RUN_API: &str = "https://run.googleapis.com/v2";
pub const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";
pub const SQL_API: &str = "https://sqladmin.googleapis.com/v1";
pub const SCHEDULER_API: &str = "https://cloudscheduler.googleapis.com/v1";

/// Regional Knative-style endpoint serving Cloud Run domain mappings.
pub fn domain_mapping_api(region: &str) -> String {
    format!("https://{region}-run.googleapis.com/apis/domains.cloudrun.com/v1")
}

/// Abstraction over authenticated REST calls for testability.
///
/// Production code uses [`HttpTransport`], tests use mockall-generated mocks.
#[allow(async_fn_in_trait)]
pub trait ApiTransport: Send + Sync {
    /// Send a request and decode the JSON response (`Null` for an empty body).
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;
}

/// Access token of the active gcloud account, fetched on first use.
///
/// Tokens expire after about an hour; a request answered with 401 asks for a
/// fresh one.
struct TokenCache<E: CommandExecutor> {
    gcloud: GcloudClient<E>,
    token: Mutex<Option<Arc<SecretString>>>,
}

impl<E: CommandExecutor> TokenCache<E> {
    fn new(gcloud: GcloudClient<E>) -> Self {
        Self {
            gcloud,
            token: Mutex::new(None),
        }
    }

    /// The cached token, unless it is `rejected`; then a new one.
    async fn get(
        &self,
        rejected: Option<&Arc<SecretString>>,
    ) -> Result<Arc<SecretString>, ApiError> {
        let mut slot = self.token.lock().await;
        let current = slot
            .as_ref()
            .filter(|token| rejected.is_none_or(|r| !Arc::ptr_eq(r, token)));
        if let Some(token) = current {
            return Ok(Arc::clone(token));
        }

        let fresh = self
            .gcloud
            .access_token()
            .await
            .map(Arc::new)
            .map_err(|e| ApiError::Token { source: e })?;
        *slot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}

/// `reqwest` transport authenticated with the active gcloud account.
///
/// The access token is shared by clones.
pub struct HttpTransport<E: CommandExecutor = RealExecutor> {
    http: reqwest::Client,
    tokens: Arc<TokenCache<E>>,
}

impl HttpTransport<RealExecutor> {
    pub fn new() -> Self {
        Self::with_gcloud(GcloudClient::new())
    }
}

impl Default for HttpTransport<RealExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> Clone for HttpTransport<E> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            tokens: Arc::clone(&self.tokens),
        }
    }
}

impl<E: CommandExecutor> HttpTransport<E> {
    pub fn with_gcloud(gcloud: GcloudClient<E>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens: Arc::new(TokenCache::new(gcloud)),
        }
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: &SecretString,
    ) -> Result<Value, ApiError> {
        tracing::debug!(%method, url, "api request");
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ApiError::Http {
            url: url.to_owned(),
            source: e,
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Http {
            url: url.to_owned(),
            source: e,
        })?;

        if !status.is_success() {
            return Err(ApiError::Status {
                method,
                url: url.to_owned(),
                status: status.as_u16(),
                detail: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            url: url.to_owned(),
            source: e,
        })
    }
}

impl<E: CommandExecutor> ApiTransport for HttpTransport<E> {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let token = self.tokens.get(None).await?;
        match self.request(method.clone(), url, body.as_ref(), &token).await {
            Err(e) if e.is_unauthorized() => {
                tracing::debug!(url, "access token rejected, refreshing");
                let token = self.tokens.get(Some(&token)).await?;
                self.request(method, url, body.as_ref(), &token).await
            }
            result => result,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to obtain an access token")]
    Token { source: CommandError },

    #[error("request to {url} failed")]
    Http { url: String, source: reqwest::Error },

    /// The platform answered with a non-2xx status; `detail` is its body verbatim.
    #[error("{method} {url} returned {status}: {detail}")]
    Status {
        method: Method,
        url: String,
        status: u16,
        detail: String,
    },

    #[error("response from {url} was not valid JSON")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }

    /// `error.message` of a Google API error body, when present.
    pub fn platform_message(&self) -> Option<String> {
        let ApiError::Status { detail, .. } = self else {
            return None;
        };
        let body: Value = serde_json::from_str(detail).ok()?;
        body.pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        Executor {}

        impl CommandExecutor for Executor {
            async fn exec(&self, args: &[String]) -> Result<String, CommandError>;
            async fn exec_streaming(&self, args: &[String]) -> Result<(), CommandError>;
            async fn exec_with_stdin(
                &self,
                args: &[String],
                stdin_data: &[u8],
            ) -> Result<String, CommandError>;
        }
    }

    fn tokens(issued: &'static [&'static str]) -> TokenCache<MockExecutor> {
        let mut gcloud = MockExecutor::new();
        let mut next = issued.iter();
        gcloud
            .expect_exec()
            .times(issued.len())
            .returning(move |_| Ok(format!("{}\n", next.next().unwrap())));
        TokenCache::new(GcloudClient::with_executor(gcloud))
    }

    #[tokio::test]
    async fn token_is_fetched_once() {
        let cache = tokens(&["ya29.first"]);

        let a = cache.get(None).await.unwrap();
        let b = cache.get(None).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.expose_secret(), "ya29.first");
    }

    #[tokio::test]
    async fn rejected_token_is_replaced() {
        let cache = tokens(&["ya29.first", "ya29.second"]);

        let expired = cache.get(None).await.unwrap();
        let fresh = cache.get(Some(&expired)).await.unwrap();

        assert_eq!(fresh.expose_secret(), "ya29.second");
        // A caller still holding the expired token gets the refreshed one.
        let again = cache.get(Some(&expired)).await.unwrap();
        assert!(Arc::ptr_eq(&fresh, &again));
    }

    #[test]
    fn unauthorized_detection() {
        assert!(status(401, "").is_unauthorized());
        assert!(!status(403, "").is_unauthorized());
    }

    fn status(code: u16, detail: &str) -> ApiError {
        ApiError::Status {
            method: Method::PATCH,
            url: "https://run.googleapis.com/v2/x".to_owned(),
            status: code,
            detail: detail.to_owned(),
        }
    }

    #[test]
    fn not_found_detection() {
        assert!(status(404, "").is_not_found());
        assert!(!status(403, "").is_not_found());
    }

    #[test]
    fn platform_message_is_extracted() {
        let err = status(
            403,
            r#"{"error":{"code":403,"message":"Permission 'run.services.update' denied","status":"PERMISSION_DENIED"}}"#,
        );
        assert_eq!(
            err.platform_message().as_deref(),
            Some("Permission 'run.services.update' denied")
        );
        assert!(err.to_string().contains("PERMISSION_DENIED"));
    }

    #[test]
    fn platform_message_absent_for_plain_bodies() {
        assert!(status(500, "upstream timeout").platform_message().is_none());
    }
}
