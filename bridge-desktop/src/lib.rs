//! # Desktop Bridge Implementations
//!
//! Bridge trait implementations for desktop hosts (macOS, Windows, Linux):
//!
//! - [`ReqwestHttpClient`]: `HttpClient` over `reqwest` with rustls and a
//!   per-request deadline
//! - `KeyringSecureStore`: `SecureStore` in the OS credential vault
//!   (`secure-store` feature, on by default)
//! - [`FileSecureStore`]: `SecureStore` writing one owner-only JSON file per
//!   key under the platform data directory
//!
//! [`default_secure_store`] picks the vault when it is compiled in and the
//! file store otherwise.
//!
//! ```ignore
//! use bridge_desktop::{default_secure_store, ReqwestHttpClient};
//! use std::time::Duration;
//!
//! let http_client = ReqwestHttpClient::with_timeout(Duration::from_secs(10));
//! let secure_store = default_secure_store();
//! ```

use std::sync::Arc;

use bridge_traits::storage::SecureStore;

mod file_store;
mod http;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use file_store::FileSecureStore;
pub use http::ReqwestHttpClient;

#[cfg(feature = "secure-store")]
pub use secure_store::{KeyringSecureStore, DEFAULT_SERVICE_NAME};

/// The store desktop hosts should keep the session in.
#[cfg(feature = "secure-store")]
pub fn default_secure_store() -> Arc<dyn SecureStore> {
    Arc::new(KeyringSecureStore::new())
}

/// The store desktop hosts should keep the session in.
#[cfg(not(feature = "secure-store"))]
pub fn default_secure_store() -> Arc<dyn SecureStore> {
    Arc::new(FileSecureStore::new())
}
