//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the client core and platform-specific
//! implementations. Each trait represents a capability that the core requires but
//! that must be implemented differently per platform (desktop, iOS, Android).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with headers and timeouts
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Durable credential persistence (Keychain/Keystore/files)
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! `bridge-desktop` provides a reqwest-backed `HttpClient` and a file-backed
//! `SecureStore`. Mobile hosts implement the traits over their native stacks
//! and hand them to `ClientConfig`.
//!
//! ## Errors
//!
//! Implementations convert platform failures into [`BridgeError`]. A request
//! whose deadline elapsed must surface as [`BridgeError::Timeout`] and a
//! connection-level failure as [`BridgeError::Network`]; the auth layer
//! reports both as network errors without touching the session.
//!
//! All traits are `Send + Sync` and are shared behind `Arc`.

pub mod error;
pub mod http;
pub mod logging;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use storage::SecureStore;
