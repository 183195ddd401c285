//! # Authentication Module
//!
//! Session management and token-refreshing HTTP transport for the Haki
//! backend.
//!
//! ## Overview
//!
//! This module keeps the signed-in user's credentials and makes every backend
//! call with them. When the backend rejects an expired access token, the
//! transport silently exchanges the refresh token for a new one and resends
//! the request.
//!
//! ## Features
//!
//! - Process-wide [`SessionStore`] with snapshot reads and change notification
//! - Session persistence via platform-specific secure stores
//! - [`AuthenticatedTransport`] with bearer injection and one-shot refresh on 401
//! - Coalesced refreshes across concurrent requests
//! - Login, account creation and logout flows with event emission

pub mod error;
pub mod manager;
pub mod persistence;
pub mod session_store;
pub mod transport;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::AuthManager;
pub use persistence::SessionPersistence;
pub use session_store::SessionStore;
pub use transport::{
    ApiRequest, ApiResponse, AuthenticatedTransport, CREATE_ACCOUNT_PATH, LOGIN_PATH,
    REFRESH_PATH,
};
pub use types::{Credentials, Location, LoginResponse, RefreshResponse, Session, StoredSession};
