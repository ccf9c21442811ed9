//! Request pipeline against the remote API.
//!
//! Every call the host issues goes through [`ApiGateway::execute`], which
//! attaches the bearer token, translates failures into the closed
//! [`ApiError`] set, and on an authorization failure clears the session and
//! fires the invalidation hook so the host can navigate back to login.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{self, ApiError, ApiResult};
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

/// One outbound call, transport-agnostic.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, bearer: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status plus parsed JSON body. Empty or non-JSON bodies come back as
/// `Value::Null`; normalization treats that as "no recognizable payload".
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure below the HTTP layer: no response was received at all.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to reach server: {0}")]
    Connect(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Seam between the pipeline and the wire. The live implementation is
/// [`HttpTransport`]; tests script responses in-process.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: ApiRequest) -> Result<RawResponse, TransportError>;
}

/// reqwest-backed transport with a fixed base URL per deployment.
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    /// `base` carries the deployment's API prefix, e.g.
    /// `https://localhost:44388/api`.
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base)?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { base, client })
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: ApiRequest) -> Result<RawResponse, TransportError> {
        let url = self.url_for(&req.path);
        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder.header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &req.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &req.body {
            // .json also sets Content-Type: application/json
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Ok(RawResponse::new(status, body))
    }
}

type InvalidatedHook = Arc<dyn Fn() + Send + Sync>;

/// The single entry point for authenticated API traffic.
pub struct ApiGateway {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    on_invalidated: RwLock<Option<InvalidatedHook>>,
}

impl ApiGateway {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<SessionStore>) -> Self {
        Self { transport, session, on_invalidated: RwLock::new(None) }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Register the host's reaction to a server-side session invalidation
    /// (typically a forced navigation to the login screen). The hook must be
    /// idempotent; concurrent failing calls each fire it independently.
    pub fn on_session_invalidated<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_invalidated.write() = Some(Arc::new(hook));
    }

    /// Authenticate against `/auth/login` and populate the session store.
    pub async fn login(&self, credentials: &crate::session::Credentials) -> ApiResult<crate::session::Session> {
        self.session.login(self.transport.as_ref(), credentials).await
    }

    /// Run one request through the pipeline: attach bearer, send, inspect.
    ///
    /// A 401 is proof of server-side invalidation even if the local expiry
    /// has not passed: the session is cleared and the hook fires before the
    /// error is returned. Every other failure leaves the session untouched.
    pub async fn execute(&self, mut req: ApiRequest) -> ApiResult<Value> {
        if let Some(session) = self.session.current() {
            req.bearer = Some(session.token);
        }
        debug!("{} {}", req.method.as_str(), req.path);

        let resp = match self.transport.send(req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("transport failure: {}", e);
                return Err(ApiError::network());
            }
        };

        if resp.status == 401 {
            warn!("server rejected credentials, invalidating session");
            self.session.clear();
            // Invoke outside the guard so a hook may touch the gateway
            // (e.g. re-register) without deadlocking.
            let hook = self.on_invalidated.read().clone();
            if let Some(hook) = hook {
                hook();
            }
            return Err(ApiError::unauthorized());
        }

        if !resp.is_success() {
            return Err(error::normalize(resp.status, &resp.body));
        }

        Ok(resp.body)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let body = self.execute(ApiRequest::get(path)).await?;
        decode(body)
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResult<T> {
        let payload = encode(body)?;
        let body = self.execute(ApiRequest::post(path).json(payload)).await?;
        decode(body)
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> ApiResult<T> {
        let payload = encode(body)?;
        let body = self.execute(ApiRequest::put(path).json(payload)).await?;
        decode(body)
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let body = self.execute(ApiRequest::delete(path)).await?;
        decode(body)
    }
}

fn encode<B: Serialize>(body: &B) -> ApiResult<Value> {
    serde_json::to_value(body).map_err(|e| {
        warn!("failed to encode request body: {}", e);
        ApiError::unknown()
    })
}

fn decode<T: DeserializeOwned>(body: Value) -> ApiResult<T> {
    serde_json::from_value(body).map_err(|e| {
        warn!("unexpected response shape: {}", e);
        ApiError::unknown()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builders() {
        let req = ApiRequest::post("/Department").json(serde_json::json!({"name": "x"}));
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "/Department");
        assert!(req.body.is_some());
        assert!(req.bearer.is_none());
    }

    #[test]
    fn url_join_handles_slashes() {
        let t = HttpTransport::new("https://localhost:44388/api/").unwrap();
        assert_eq!(t.url_for("/Department/3"), "https://localhost:44388/api/Department/3");
        assert_eq!(t.url_for("Person"), "https://localhost:44388/api/Person");
    }

    #[test]
    fn success_range() {
        assert!(RawResponse::new(200, Value::Null).is_success());
        assert!(RawResponse::new(204, Value::Null).is_success());
        assert!(!RawResponse::new(301, Value::Null).is_success());
        assert!(!RawResponse::new(401, Value::Null).is_success());
    }
}
