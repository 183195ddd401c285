//! OS credential vault storage
//!
//! Each key becomes one credential of the `haki-client` service in the
//! platform vault: Keychain on macOS, Credential Manager on Windows and the
//! kernel keyutils session keyring on Linux.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SecureStore,
};
use keyring::Entry;
use tracing::debug;

pub const DEFAULT_SERVICE_NAME: &str = "haki-client";

/// `SecureStore` backed by the `keyring` crate.
///
/// Values are stored as raw secret bytes, so the serialized session record
/// goes into the vault unchanged. Vault calls block, so they run on the
/// blocking thread pool.
///
/// On Linux the keyutils keyring does not survive a reboot; the user signs
/// in again afterwards. Hosts that need the session across reboots there can
/// inject [`FileSecureStore`](crate::FileSecureStore) instead.
#[derive(Debug, Clone)]
pub struct KeyringSecureStore {
    service_name: String,
}

impl KeyringSecureStore {
    pub fn new() -> Self {
        Self::with_service_name(DEFAULT_SERVICE_NAME)
    }

    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Run `op` against the entry for `key` on the blocking pool.
    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service_name.clone();
        let user = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, &user).map_err(map_keyring_error)?;
            op(entry).map_err(map_keyring_error)
        })
        .await
        .map_err(|e| BridgeError::OperationFailed(format!("keyring task failed: {}", e)))?
    }
}

impl Default for KeyringSecureStore {
    fn default() -> Self {
        Self::new()
    }
}

fn map_keyring_error(e: keyring::Error) -> BridgeError {
    match e {
        keyring::Error::NoStorageAccess(inner) => {
            BridgeError::NotAvailable(format!("credential vault locked or missing: {}", inner))
        }
        other => BridgeError::OperationFailed(format!("keyring: {}", other)),
    }
}

/// `NoEntry` means "nothing stored", not a failure.
fn absent_as_none<T>(
    result: std::result::Result<T, keyring::Error>,
) -> std::result::Result<Option<T>, keyring::Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl SecureStore for KeyringSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let value = value.to_vec();
        self.with_entry(key, move |entry| entry.set_secret(&value))
            .await?;

        debug!(key = key, "Stored secret in keyring");
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let secret = self
            .with_entry(key, |entry| absent_as_none(entry.get_secret()))
            .await?;

        debug!(key = key, found = secret.is_some(), "Read secret from keyring");
        Ok(secret)
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        let removed = self
            .with_entry(key, |entry| absent_as_none(entry.delete_credential()))
            .await?;

        debug!(key = key, existed = removed.is_some(), "Deleted secret from keyring");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_name() {
        let store = KeyringSecureStore::default();
        assert_eq!(store.service_name(), "haki-client");
    }

    #[test]
    fn test_absent_entry_maps_to_none() {
        assert_eq!(absent_as_none::<u8>(Err(keyring::Error::NoEntry)).unwrap(), None);
        assert_eq!(absent_as_none(Ok(7u8)).unwrap(), Some(7));
        assert!(absent_as_none::<u8>(Err(keyring::Error::Invalid(
            "user".to_string(),
            "empty".to_string()
        )))
        .is_err());
    }

    #[tokio::test]
    async fn test_session_record_round_trip() {
        // Containers and CI often have no reachable vault.
        let store = KeyringSecureStore::with_service_name("haki-client-test");
        let key = "session-test-key";
        let record = br#"{"access_token":"A1","refresh_token":"R1"}"#;

        if let Err(e) = store.set_secret(key, record).await {
            println!("Keyring not available ({}), skipping", e);
            return;
        }

        assert_eq!(store.get_secret(key).await.unwrap(), Some(record.to_vec()));
        store.delete_secret(key).await.unwrap();
        store.delete_secret(key).await.unwrap();
        assert_eq!(store.get_secret(key).await.unwrap(), None);
    }
}
