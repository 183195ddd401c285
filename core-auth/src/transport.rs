//! Authenticated Transport
//!
//! Wraps a host [`HttpClient`] so that every backend call carries the current
//! access token and recovers once from an expired token.
//!
//! ## Request flow
//!
//! 1. Attach `Authorization: Bearer <access_token>` when the session has one
//!    and send with the configured deadline.
//! 2. Any status other than 401 is returned verbatim.
//! 3. On the first 401 of a call, refresh the access token:
//!    - no refresh token: clear the session, fail with `NoRefreshToken`
//!    - refresh endpoint fails: clear the session, fail with `RefreshFailed`
//!    - success: store the new token and resend the request once
//! 4. A 401 on the resent request is returned as-is.
//!
//! ## Concurrency
//!
//! Refreshes are coalesced. They run one at a time, and a request that waited
//! behind a sibling's refresh reuses the token that sibling obtained instead of
//! calling the refresh endpoint again. A request that waited behind a failed
//! refresh gets that same `RefreshFailed` error. The refresh itself runs on a
//! spawned task, so a caller that stops awaiting its request never discards a
//! refresh that is already under way.
//!
//! The configured deadline is enforced here as well as handed to the bridge,
//! so a host client that ignores `HttpRequest::timeout` still fails with
//! `BridgeError::Timeout`.
//!
//! ## Example
//!
//! ```ignore
//! use core_auth::{ApiRequest, AuthenticatedTransport};
//!
//! let response = transport.get("/protests").await?;
//! if response.is_success() {
//!     let protests: Vec<Protest> = response.json()?;
//! }
//! ```

use crate::error::{AuthError, Result};
use crate::session_store::SessionStore;
use crate::types::RefreshResponse;
use bridge_traits::error::BridgeError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::config::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub const LOGIN_PATH: &str = "/login";
pub const CREATE_ACCOUNT_PATH: &str = "/create_account";
pub const REFRESH_PATH: &str = "/refresh";

const UNAUTHORIZED: u16 = 401;

/// A backend call, described relative to the API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Bytes>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            content_type: None,
            headers: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| AuthError::SerializationFailed {
            context: format!("request body for {}", self.path),
            source: e,
        })?;
        self.body = Some(Bytes::from(json));
        self.content_type = Some("application/json".to_string());
        Ok(self)
    }

    /// Raw payload, e.g. an image upload.
    pub fn body(mut self, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.content_type = Some(content_type.into());
        self
    }

    /// Extra header. The session's `Authorization` header takes precedence.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Status and decoded body of a completed call.
///
/// `data` is the parsed JSON body, a JSON string when the body is not JSON,
/// or `null` when the body is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub data: Value,
}

impl ApiResponse {
    fn from_http(response: HttpResponse) -> Self {
        let data = if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response.body).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&response.body).into_owned())
            })
        };

        Self {
            status: response.status,
            headers: response.headers,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize `data` into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            AuthError::InvalidResponse(format!(
                "unexpected body for status {}: {}",
                self.status, e
            ))
        })
    }

    /// The backend's `detail` message on error responses.
    pub fn error_detail(&self) -> Option<String> {
        match self.data.get("detail")? {
            Value::String(detail) => Some(detail.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

/// HTTP transport that injects bearer tokens and refreshes them on 401.
///
/// Cheap to clone; clones share the session, the refresh lock and the
/// underlying client.
#[derive(Clone)]
pub struct AuthenticatedTransport {
    http_client: Arc<dyn HttpClient>,
    session_store: SessionStore,
    base_url: Arc<str>,
    timeout: Duration,
    user_agent: Option<Arc<str>>,
    refresher: Refresher,
}

impl AuthenticatedTransport {
    /// Create a transport against the default backend.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        session_store: SessionStore,
        event_bus: EventBus,
    ) -> Self {
        Self::with_settings(
            http_client,
            session_store,
            event_bus,
            DEFAULT_BASE_URL,
            DEFAULT_REQUEST_TIMEOUT,
            None,
        )
    }

    /// Create a transport from a validated [`ClientConfig`].
    pub fn from_config(
        config: &ClientConfig,
        session_store: SessionStore,
        event_bus: EventBus,
    ) -> Self {
        Self::with_settings(
            Arc::clone(&config.http_client),
            session_store,
            event_bus,
            &config.base_url,
            config.request_timeout,
            config.user_agent.as_deref(),
        )
    }

    fn with_settings(
        http_client: Arc<dyn HttpClient>,
        session_store: SessionStore,
        event_bus: EventBus,
        base_url: &str,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Self {
        let base_url: Arc<str> = Arc::from(base_url.trim_end_matches('/'));
        let refresher = Refresher {
            http_client: Arc::clone(&http_client),
            session_store: session_store.clone(),
            event_bus,
            url: Arc::from(join_url(&base_url, REFRESH_PATH)),
            timeout,
            state: Arc::new(Mutex::new(RefreshState::default())),
        };

        Self {
            http_client,
            session_store,
            base_url,
            timeout,
            user_agent: user_agent.map(Arc::from),
            refresher,
        }
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.session_store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` with the session's access token, refreshing once on 401.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Network`] on transport failure or timeout
    /// - [`AuthError::NoRefreshToken`] / [`AuthError::RefreshFailed`] when the
    ///   token could not be renewed; the session has been cleared
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut token = self.session_store.get().access_token().map(str::to_owned);
        let mut retried = false;

        loop {
            let response = self.send(&request, token.as_deref()).await?;

            if response.status != UNAUTHORIZED {
                return Ok(ApiResponse::from_http(response));
            }

            if retried {
                debug!("Resent request still unauthorized, returning 401");
                return Ok(ApiResponse::from_http(response));
            }
            retried = true;

            debug!(had_token = token.is_some(), "Unauthorized, refreshing access token");
            token = Some(self.refresh_after_unauthorized(token).await?);
        }
    }

    /// Send `request` without credentials and without the refresh protocol.
    ///
    /// Used for login and account creation, where a 401 means bad
    /// credentials rather than an expired token.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn request_public(&self, request: ApiRequest) -> Result<ApiResponse> {
        let response = self.send(&request, None).await?;
        Ok(ApiResponse::from_http(response))
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<HttpResponse> {
        let mut http = HttpRequest::new(request.method, join_url(&self.base_url, &request.path))
            .timeout(self.timeout);

        for (name, value) in &request.headers {
            http = http.header(name.as_str(), value.as_str());
        }
        if let Some(user_agent) = &self.user_agent {
            http = http.header("User-Agent", user_agent.to_string());
        }
        if let Some(content_type) = &request.content_type {
            http = http.header("Content-Type", content_type.as_str());
        }
        if let Some(body) = &request.body {
            http = http.body(body.clone());
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            http = http.bearer_token(token);
        }

        let response = execute_within(self.http_client.as_ref(), http, self.timeout)
            .await
            .map_err(|e| {
                warn!(error = %e, "Backend request failed");
                AuthError::from(e)
            })?;

        debug!(status = response.status, "Backend responded");
        Ok(response)
    }

    async fn refresh_after_unauthorized(&self, stale: Option<String>) -> Result<String> {
        let refresher = self.refresher.clone();
        match tokio::spawn(refresher.refresh(stale)).await {
            Ok(result) => result,
            Err(join_err) => Err(AuthError::RefreshFailed {
                reason: format!("refresh task did not complete: {}", join_err),
            }),
        }
    }
}

impl std::fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// The refresh half of the transport, owned by the spawned refresh task.
#[derive(Clone)]
struct Refresher {
    http_client: Arc<dyn HttpClient>,
    session_store: SessionStore,
    event_bus: EventBus,
    url: Arc<str>,
    timeout: Duration,
    state: Arc<Mutex<RefreshState>>,
}

/// Guarded by the refresh lock.
#[derive(Default)]
struct RefreshState {
    last_failure: Option<FailedRefresh>,
}

/// The access token whose 401 started a refresh that failed, and why.
struct FailedRefresh {
    rejected: String,
    reason: String,
}

impl RefreshState {
    fn failure_for(&self, stale: Option<&str>) -> Option<&str> {
        let failure = self.last_failure.as_ref()?;
        (Some(failure.rejected.as_str()) == stale).then_some(failure.reason.as_str())
    }

    fn record_failure(&mut self, stale: Option<&str>, reason: &str) {
        self.last_failure = stale.map(|rejected| FailedRefresh {
            rejected: rejected.to_string(),
            reason: reason.to_string(),
        });
    }
}

impl Refresher {
    /// Obtain a usable access token after `stale` was rejected.
    async fn refresh(self, stale: Option<String>) -> Result<String> {
        let mut state = self.state.lock().await;

        let current = self.session_store.get();
        if let Some(current_token) = current.access_token() {
            if stale.as_deref() != Some(current_token) {
                debug!("Access token already renewed by a concurrent request");
                return Ok(current_token.to_string());
            }
        }

        if current.refresh_token().is_none() {
            if let Some(reason) = state.failure_for(stale.as_deref()) {
                debug!("Concurrent refresh for this token already failed");
                return Err(AuthError::RefreshFailed {
                    reason: reason.to_string(),
                });
            }
        }

        let Some(refresh_token) = current.refresh_token().map(str::to_owned) else {
            warn!("No refresh token available, clearing session");
            self.session_store.clear().await;
            self.emit(AuthEvent::SessionExpired {
                reason: "no_refresh_token".to_string(),
            });
            return Err(AuthError::NoRefreshToken);
        };

        self.emit(AuthEvent::TokenRefreshing);

        let response = match self.call_refresh_endpoint(&refresh_token).await {
            Ok(response) => response,
            Err(reason) => {
                warn!(reason = %reason, "Token refresh failed, clearing session");
                state.record_failure(stale.as_deref(), &reason);
                self.session_store.clear().await;
                self.emit(AuthEvent::SessionExpired {
                    reason: "refresh_failed".to_string(),
                });
                return Err(AuthError::RefreshFailed { reason });
            }
        };

        let access_token = response.access_token.clone();
        let mut applied = false;
        let mut rotated = false;
        self.session_store
            .update(|session| {
                // Signed out (or signed in elsewhere) while the refresh was in flight.
                if session.refresh_token() == Some(refresh_token.as_str()) {
                    rotated = session.apply_refresh(response);
                    applied = true;
                }
            })
            .await;

        if !applied {
            warn!("Session changed during refresh, discarding refreshed token");
            let reason = "session changed during refresh".to_string();
            state.record_failure(stale.as_deref(), &reason);
            return Err(AuthError::RefreshFailed { reason });
        }

        state.last_failure = None;
        info!(rotated = rotated, "Access token refreshed");
        self.emit(AuthEvent::TokenRefreshed { rotated });
        Ok(access_token)
    }

    async fn call_refresh_endpoint(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<RefreshResponse, String> {
        let request = HttpRequest::new(HttpMethod::Post, self.url.to_string())
            .bearer_token(refresh_token)
            .timeout(self.timeout);

        let response = execute_within(self.http_client.as_ref(), request, self.timeout)
            .await
            .map_err(|e| format!("refresh request failed: {}", e))?;

        if !response.is_success() {
            return Err(format!("refresh endpoint returned status {}", response.status));
        }

        let refreshed: RefreshResponse = response
            .json()
            .map_err(|e| format!("malformed refresh response: {}", e))?;

        if refreshed.access_token.is_empty() {
            return Err("refresh response carried an empty access token".to_string());
        }

        Ok(refreshed)
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

/// Run `request` on `client`, failing with `BridgeError::Timeout` once
/// `deadline` elapses even if the client never returns.
async fn execute_within(
    client: &dyn HttpClient,
    request: HttpRequest,
    deadline: Duration,
) -> bridge_traits::error::Result<HttpResponse> {
    match tokio::time::timeout(deadline, client.execute(request)).await {
        Ok(result) => result,
        Err(_) => Err(BridgeError::Timeout(deadline)),
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
