//! # Authentication Manager
//!
//! Account flows on top of the [`AuthenticatedTransport`]: login, account
//! creation, logout, location updates and startup restore.
//!
//! ## Overview
//!
//! The `AuthManager` owns the user-facing side of the session lifecycle:
//! - Exchanges credentials for a token pair at `POST /login`
//! - Registers accounts at `POST /create_account`
//! - Clears the session (memory and storage) on logout
//! - Emits [`AuthEvent`]s for every lifecycle change
//!
//! Token refresh is not handled here; it happens inside the transport when a
//! request comes back 401.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{AuthManager, Credentials};
//!
//! let session = manager
//!     .login(Credentials::new("amina@example.com", "secret"))
//!     .await?;
//! assert!(session.is_authenticated());
//!
//! let protests = manager.transport().get("/protests").await?;
//!
//! manager.logout().await;
//! ```

use crate::error::{AuthError, Result};
use crate::session_store::SessionStore;
use crate::transport::{ApiRequest, AuthenticatedTransport, CREATE_ACCOUNT_PATH, LOGIN_PATH};
use crate::types::{Credentials, Location, LoginResponse, Session};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_if_sensitive;
use tracing::{info, instrument, warn};

const LOGIN_SUCCESS: u16 = 200;
const ACCOUNT_CREATED: u16 = 201;

/// Coordinates account flows and session lifecycle events.
#[derive(Clone)]
pub struct AuthManager {
    transport: AuthenticatedTransport,
    event_bus: EventBus,
}

impl AuthManager {
    /// Creates a new `AuthManager`.
    ///
    /// # Arguments
    ///
    /// * `transport` - Transport whose session store this manager drives
    /// * `event_bus` - Event bus for emitting authentication events
    pub fn new(transport: AuthenticatedTransport, event_bus: EventBus) -> Self {
        Self {
            transport,
            event_bus,
        }
    }

    pub fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    pub fn session_store(&self) -> &SessionStore {
        self.transport.session_store()
    }

    /// Snapshot of the current session.
    pub fn current_session(&self) -> Session {
        self.session_store().get()
    }

    pub fn is_signed_in(&self) -> bool {
        self.current_session().is_authenticated()
    }

    /// Load the persisted session, if any, and announce it.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Option<Session> {
        let restored = self.session_store().restore().await?;

        info!(
            authenticated = restored.is_authenticated(),
            "Restored persisted session"
        );
        self.emit(AuthEvent::SessionRestored {
            authenticated: restored.is_authenticated(),
        });
        Some(restored)
    }

    /// Exchange credentials for a session.
    ///
    /// The call bypasses the refresh protocol: a 401 here means the
    /// credentials were rejected.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] for blank fields (nothing is sent)
    /// - [`AuthError::LoginRejected`] for any status other than 200
    /// - [`AuthError::InvalidResponse`] if the success body lacks a token
    /// - [`AuthError::Network`] on transport failure
    #[instrument(skip(self, credentials), fields(email = %redact_if_sensitive("email", &credentials.email)))]
    pub async fn login(&self, credentials: Credentials) -> Result<Session> {
        credentials.validate()?;

        let request = ApiRequest::post(LOGIN_PATH).json(&credentials)?;
        let response = self.transport.request_public(request).await?;

        if response.status != LOGIN_SUCCESS {
            let detail = response.error_detail();
            warn!(status = response.status, "Login rejected");
            return Err(AuthError::LoginRejected {
                status: response.status,
                detail,
            });
        }

        let login: LoginResponse = response.json()?;
        if login.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "login response carried an empty access token".to_string(),
            ));
        }

        let session = Session::from_login(login, &credentials.email);
        self.session_store().set(session.clone()).await;

        info!(
            has_refresh_token = session.refresh_token().is_some(),
            "Signed in"
        );
        self.emit(AuthEvent::SignedIn {
            email: session
                .email
                .as_deref()
                .map(|email| redact_if_sensitive("email", email)),
        });

        Ok(session)
    }

    /// Register a new account. Does not sign in.
    ///
    /// # Errors
    ///
    /// [`AuthError::AccountCreationRejected`] for any status other than 201,
    /// carrying the backend's `detail` message when present.
    #[instrument(skip(self, credentials), fields(email = %redact_if_sensitive("email", &credentials.email)))]
    pub async fn create_account(&self, credentials: Credentials) -> Result<()> {
        credentials.validate()?;

        let request = ApiRequest::post(CREATE_ACCOUNT_PATH).json(&credentials)?;
        let response = self.transport.request_public(request).await?;

        if response.status != ACCOUNT_CREATED {
            warn!(status = response.status, "Account creation rejected");
            return Err(AuthError::AccountCreationRejected {
                status: response.status,
                detail: response.error_detail(),
            });
        }

        info!("Account created");
        Ok(())
    }

    /// Clear the session in memory and in storage.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.session_store().clear().await;
        info!("Signed out");
        self.emit(AuthEvent::SignedOut);
    }

    /// Record the device's last-known position on the session.
    #[instrument(skip(self))]
    pub async fn update_location(&self, latitude: f64, longitude: f64) -> Session {
        self.session_store()
            .update_location(Some(Location::new(latitude, longitude)))
            .await
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("transport", &self.transport)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}
