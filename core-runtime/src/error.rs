use thiserror::Error;

/// Failures raised while assembling the client runtime.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {name} has invalid value '{value}': {reason}")]
    InvalidEnvVar {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
