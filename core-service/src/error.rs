use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),
}

impl CoreError {
    /// True when the host should route the user to the login screen.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, CoreError::Auth(e) if e.requires_sign_in())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
