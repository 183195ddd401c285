use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Transport failure or timeout, surfaced unchanged.
    #[error("Network error: {0}")]
    Network(#[from] BridgeError),

    #[error("No refresh token available; sign-in required")]
    NoRefreshToken,

    #[error("Token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    #[error("Login rejected (status {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    LoginRejected { status: u16, detail: Option<String> },

    #[error("Account creation rejected (status {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    AccountCreationRejected { status: u16, detail: Option<String> },

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization failed for {context}: {source}")]
    SerializationFailed {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Stored session is corrupted: {reason}")]
    TokenCorrupted { reason: String },
}

impl AuthError {
    /// True when the session was cleared and the user must sign in again.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, AuthError::NoRefreshToken | AuthError::RefreshFailed { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AuthError::Network(e) if e.is_timeout())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
