//! Durable Session Storage
//!
//! Mirrors the in-memory [`Session`] into a [`SecureStore`] under a single key
//! so a restarted process can resume where it left off.
//!
//! ## Security
//!
//! - Token values are never logged
//! - A record that fails to deserialize is deleted rather than kept around

use crate::error::{AuthError, Result};
use crate::types::{Session, StoredSession};
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persistence adapter for the serialized session record.
///
/// Errors are returned to the caller; the credential store decides whether
/// they matter (they never do during a live process).
#[derive(Clone)]
pub struct SessionPersistence {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

impl SessionPersistence {
    pub fn new(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            secure_store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the previously saved session.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(session))` if a valid record exists
    /// - `Ok(None)` if nothing was saved
    /// - `Err(TokenCorrupted)` if the record was unreadable (it is deleted)
    /// - `Err(SecureStorageUnavailable)` if the store failed
    pub async fn load(&self) -> Result<Option<Session>> {
        let data = self
            .secure_store
            .get_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to read session record");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        let Some(data) = data else {
            debug!(key = %self.key, "No session record found");
            return Ok(None);
        };

        let stored: StoredSession = match serde_json::from_slice(&data) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    key = %self.key,
                    error = %e,
                    "Failed to deserialize session record, it may be corrupted"
                );

                if let Err(delete_err) = self.secure_store.delete_secret(&self.key).await {
                    warn!(
                        key = %self.key,
                        error = %delete_err,
                        "Failed to delete corrupted session record"
                    );
                }

                return Err(AuthError::TokenCorrupted {
                    reason: e.to_string(),
                });
            }
        };

        let session = Session::from(stored);
        info!(
            key = %self.key,
            authenticated = session.is_authenticated(),
            has_refresh_token = session.refresh_token().is_some(),
            "Session record loaded"
        );

        Ok(Some(session))
    }

    /// Overwrite the stored record with `session`.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let stored = StoredSession::from(session);
        let json = serde_json::to_vec(&stored).map_err(|e| AuthError::SerializationFailed {
            context: "session record".to_string(),
            source: e,
        })?;

        self.secure_store
            .set_secret(&self.key, &json)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to write session record");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        debug!(
            key = %self.key,
            authenticated = session.is_authenticated(),
            "Session record saved"
        );
        Ok(())
    }

    /// Remove the stored record. Succeeds when nothing is stored.
    pub async fn delete(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(key = %self.key, error = %e, "Failed to delete session record");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(key = %self.key, "Session record deleted");
        Ok(())
    }
}
