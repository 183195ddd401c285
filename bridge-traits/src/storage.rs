//! Durable credential storage.
//!
//! The client keeps exactly one small record here (the serialized session),
//! so the contract is a plain byte-valued key-value store that survives
//! process restarts.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value store for secrets that must outlive the process.
///
/// Hosts back this with whatever their platform offers: Keychain or
/// Keystore on mobile, a permission-restricted file on desktop. Values are
/// opaque bytes and must never be logged.
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn forget(store: &dyn SecureStore) -> Result<()> {
///     store.delete_secret("user").await
/// }
/// ```
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
