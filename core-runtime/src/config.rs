//! # Client Configuration Module
//!
//! Provides configuration management for the Haki client core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `ClientConfig`
//! instance that holds the backend endpoint settings and the host bridges the
//! core depends on. It enforces fail-fast validation so a misconfigured client
//! never reaches the network.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - Network transport for all backend calls
//! - `SecureStore` - Durable storage for the persisted session record
//!
//! When the `desktop-shims` feature is enabled, `ReqwestHttpClient` and
//! `bridge_desktop::default_secure_store()` (the OS credential vault, or
//! `FileSecureStore` without the `secure-store` feature) are injected
//! automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .base_url("https://haki-backend-zpiz.onrender.com/api")
//!     .request_timeout(Duration::from_secs(10))
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`ClientConfigBuilder::from_env`] seeds the builder from `HAKI_API_BASE_URL`,
//! `HAKI_REQUEST_TIMEOUT_SECS` and `HAKI_STORAGE_KEY`. Bridges still have to be
//! supplied (or defaulted by `desktop-shims`).

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, SecureStore};
use std::sync::Arc;
use std::time::Duration;

/// Production backend origin including the `/api` prefix.
pub const DEFAULT_BASE_URL: &str = "https://haki-backend-zpiz.onrender.com/api";

/// Deadline applied to every backend request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Key under which the serialized session record is persisted.
pub const DEFAULT_STORAGE_KEY: &str = "user";

const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub const ENV_BASE_URL: &str = "HAKI_API_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "HAKI_REQUEST_TIMEOUT_SECS";
pub const ENV_STORAGE_KEY: &str = "HAKI_STORAGE_KEY";

/// Client configuration for the Haki core.
///
/// Use [`ClientConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend origin with path prefix, without trailing slash
    pub base_url: String,

    /// Per-request deadline
    pub request_timeout: Duration,

    /// Persistence key for the session record
    pub storage_key: String,

    /// Optional `User-Agent` header added to every backend request
    pub user_agent: Option<String>,

    /// HTTP transport (required)
    pub http_client: Arc<dyn HttpClient>,

    /// Durable credential storage (required)
    pub secure_store: Arc<dyn SecureStore>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .field("storage_key", &self.storage_key)
            .field("user_agent", &self.user_agent)
            .field("http_client", &"HttpClient { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .finish()
    }
}

impl ClientConfig {
    /// Creates a new builder for constructing a `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Base URL is non-empty and uses `http` or `https`
    /// - Request timeout is greater than zero and at most 5 minutes
    /// - Storage key is not empty
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(Error::Config("Base URL cannot be empty".to_string()));
        }

        if !(base_url.starts_with("https://") || base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "Base URL must use http or https: {}",
                base_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        if self.request_timeout > MAX_REQUEST_TIMEOUT {
            return Err(Error::Config(format!(
                "Request timeout exceeds maximum of {}s",
                MAX_REQUEST_TIMEOUT.as_secs()
            )));
        }

        if self.storage_key.trim().is_empty() {
            return Err(Error::Config("Storage key cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for backend calls. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform-native HTTP stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn secure_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "SecureStore".to_string(),
        message: "SecureStore implementation is required for session persistence. \
                 Desktop: enable the 'desktop-shims' feature to use the OS credential vault. \
                 Mobile: inject platform-native secure storage (Keychain/Keystore)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::with_timeout(timeout));
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Ok(bridge_desktop::default_secure_store())
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(secure_store_missing_error())
}

/// Builder for constructing [`ClientConfig`] instances.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    request_timeout: Option<Duration>,
    storage_key: Option<String>,
    user_agent: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
}

impl ClientConfigBuilder {
    /// Seed a builder from `HAKI_*` environment variables.
    ///
    /// Unset variables fall back to the defaults. A timeout that is not a
    /// whole number of seconds is a configuration error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }

        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| Error::InvalidEnvVar {
                name: ENV_REQUEST_TIMEOUT_SECS,
                value: raw.clone(),
                reason: "expected a whole number of seconds",
            })?;
            builder = builder.request_timeout(Duration::from_secs(secs));
        }

        if let Some(key) = lookup(ENV_STORAGE_KEY) {
            builder = builder.storage_key(key);
        }

        Ok(builder)
    }

    /// Sets the backend origin, e.g. `https://host/api`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure storage implementation.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Builds the final `ClientConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(ClientConfig)` on success, or an error if:
    /// - Required bridges are missing (HttpClient, SecureStore)
    /// - Configuration values are invalid
    pub fn build(self) -> Result<ClientConfig> {
        let request_timeout = self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(request_timeout)?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let config = ClientConfig {
            base_url: self
                .base_url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            request_timeout,
            storage_key: self
                .storage_key
                .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
            user_agent: self.user_agent,
            http_client,
            secure_store,
        };

        config.validate()?;

        Ok(config)
    }
}
