//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage) into the shared Rust core, restores the persisted session and
//! hands back a ready [`CoreService`]. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) and let the
//! configuration inject `ReqwestHttpClient` and the OS credential vault.
//!
//! ```ignore
//! use core_service::{ClientConfig, CoreService};
//!
//! let config = ClientConfig::builder().build()?;
//! let core = CoreService::bootstrap(config).await?;
//!
//! if core.auth().is_signed_in() {
//!     let protests = core.transport().get("/protests").await?;
//! }
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_auth::{
    ApiRequest, ApiResponse, AuthError, AuthManager, AuthenticatedTransport, Credentials,
    Location, Session, SessionStore,
};
pub use core_runtime::config::{ClientConfig, ClientConfigBuilder};
pub use core_runtime::events::{AuthEvent, CoreEvent, EventBus, EventStream};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::{default_secure_store, FileSecureStore, ReqwestHttpClient};

use std::sync::Arc;

use bridge_traits::{http::HttpClient, storage::SecureStore};
use core_auth::SessionPersistence;
use core_runtime::events::DEFAULT_EVENT_BUFFER_SIZE;
use tracing::{info, instrument};

/// Aggregated handle to the bridge dependencies the core uses.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
}

impl CoreDependencies {
    pub fn new(http_client: Arc<dyn HttpClient>, secure_store: Arc<dyn SecureStore>) -> Self {
        Self {
            http_client,
            secure_store,
        }
    }
}

impl From<&ClientConfig> for CoreDependencies {
    fn from(config: &ClientConfig) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            Arc::clone(&config.secure_store),
        )
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<ClientConfig>,
    deps: Arc<CoreDependencies>,
    event_bus: EventBus,
    auth: AuthManager,
}

impl CoreService {
    /// Wire the core from `config` without touching storage.
    ///
    /// The session starts empty; call [`bootstrap`](Self::bootstrap) to also
    /// restore the persisted session.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let deps = CoreDependencies::from(&config);
        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);
        let persistence =
            SessionPersistence::new(Arc::clone(&deps.secure_store), config.storage_key.clone());
        let session_store = SessionStore::new(persistence);
        let transport =
            AuthenticatedTransport::from_config(&config, session_store, event_bus.clone());
        let auth = AuthManager::new(transport, event_bus.clone());

        Ok(Self {
            config: Arc::new(config),
            deps: Arc::new(deps),
            event_bus,
            auth,
        })
    }

    /// Wire the core and restore any persisted session.
    #[instrument(skip(config), fields(base_url = %config.base_url))]
    pub async fn bootstrap(config: ClientConfig) -> Result<Self> {
        let service = Self::new(config)?;
        let restored = service.auth.restore().await;

        info!(
            signed_in = restored.as_ref().is_some_and(Session::is_authenticated),
            "Core service ready"
        );
        Ok(service)
    }

    /// Bootstrap with desktop bridges, reading `HAKI_*` environment overrides.
    #[cfg(feature = "desktop-shims")]
    pub async fn bootstrap_desktop() -> Result<Self> {
        let config = ClientConfigBuilder::from_env()?.build()?;
        Self::bootstrap(config).await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    /// Transport for all authenticated backend calls.
    pub fn transport(&self) -> &AuthenticatedTransport {
        self.auth.transport()
    }

    pub fn session(&self) -> Session {
        self.auth.current_session()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Stream of session lifecycle events.
    pub fn auth_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Auth(_)))
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .finish()
    }
}
