//! Credential Store
//!
//! Process-wide holder of the current [`Session`]. Readers get an immutable
//! snapshot without waiting; writers replace the session wholesale and mirror
//! it into [`SessionPersistence`].
//!
//! ## Concurrency
//!
//! The session lives in a `tokio::sync::watch` channel, so a reader always
//! sees either the old or the new session, never a mix. Writes are serialized
//! by an async mutex that is held across the persistence call, so the stored
//! record always matches the last session published in memory.
//!
//! Persistence failures are logged and swallowed: the in-memory session is
//! authoritative while the process runs.

use crate::error::AuthError;
use crate::persistence::SessionPersistence;
use crate::types::{Location, Session};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<Session>,
    persistence: SessionPersistence,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Create an empty store. Call [`restore`](Self::restore) to load a
    /// persisted session.
    pub fn new(persistence: SessionPersistence) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                state,
                persistence,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Snapshot of the current session.
    pub fn get(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    /// Observe every session replacement.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    /// Replace the session and persist it.
    ///
    /// An empty session deletes the stored record instead of writing one.
    pub async fn set(&self, session: Session) {
        let _guard = self.inner.write_lock.lock().await;
        self.publish_and_persist(session).await;
    }

    /// Equivalent to `set(Session::default())`.
    pub async fn clear(&self) {
        self.set(Session::default()).await;
        info!("Session cleared");
    }

    /// Read-modify-write under the write lock.
    ///
    /// Returns the session that was published.
    pub async fn update<F>(&self, f: F) -> Session
    where
        F: FnOnce(&mut Session),
    {
        let _guard = self.inner.write_lock.lock().await;
        let mut session = self.get();
        f(&mut session);
        self.publish_and_persist(session.clone()).await;
        session
    }

    /// Replace only the location.
    pub async fn update_location(&self, location: Option<Location>) -> Session {
        self.update(|session| session.location = location).await
    }

    /// Load the persisted session into memory.
    ///
    /// A corrupted or unreadable record is treated as "none found".
    /// Returns the restored session, if any.
    pub async fn restore(&self) -> Option<Session> {
        let _guard = self.inner.write_lock.lock().await;

        let session = match self.inner.persistence.load().await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(AuthError::TokenCorrupted { reason }) => {
                warn!(reason = %reason, "Discarded corrupted session record");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Could not restore session, starting signed out");
                return None;
            }
        };

        self.inner.state.send_replace(session.clone());
        debug!(
            authenticated = session.is_authenticated(),
            "Session restored into memory"
        );
        Some(session)
    }

    async fn publish_and_persist(&self, session: Session) {
        let empty = session.is_empty();
        let persisted = if empty {
            self.inner.state.send_replace(Session::default());
            self.inner.persistence.delete().await
        } else {
            self.inner.state.send_replace(session.clone());
            self.inner.persistence.save(&session).await
        };

        if let Err(e) = persisted {
            warn!(error = %e, cleared = empty, "Session persistence failed; in-memory session kept");
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session", &*self.inner.state.borrow())
            .field("key", &self.inner.persistence.key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::SecureStore;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MockSecureStore {
        storage: Mutex<HashMap<String, Vec<u8>>>,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl SecureStore for MockSecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(BridgeError::OperationFailed("disk full".to_string()));
            }
            self.storage
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.storage.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.storage.lock().await.remove(key);
            Ok(())
        }
    }

    fn store_with(secure: Arc<MockSecureStore>) -> SessionStore {
        SessionStore::new(SessionPersistence::new(secure, "user"))
    }

    fn signed_in() -> Session {
        Session {
            access_token: Some("A1".to_string()),
            refresh_token: Some("R1".to_string()),
            email: Some("amina@example.com".to_string()),
            location: None,
        }
    }

    #[tokio::test]
    async fn test_set_is_visible_and_persisted() {
        let secure = Arc::new(MockSecureStore::default());
        let store = store_with(secure.clone());

        assert!(store.get().is_empty());
        store.set(signed_in()).await;

        assert_eq!(store.get(), signed_in());
        let persisted = SessionPersistence::new(secure, "user").load().await.unwrap();
        assert_eq!(persisted, Some(signed_in()));
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let secure = Arc::new(MockSecureStore::default());
        let store = store_with(secure.clone());
        store.set(signed_in()).await;

        store.clear().await;

        assert!(store.get().is_empty());
        assert!(!secure.has_secret("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_blank_email_session_deletes_record() {
        let secure = Arc::new(MockSecureStore::default());
        let store = store_with(secure.clone());
        store.set(signed_in()).await;

        store
            .set(Session {
                email: Some(String::new()),
                ..Default::default()
            })
            .await;

        assert!(store.get().is_empty());
        assert!(!secure.has_secret("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_memory_authoritative() {
        let secure = Arc::new(MockSecureStore::default());
        secure.fail_writes.store(true, Ordering::SeqCst);
        let store = store_with(secure.clone());

        store.set(signed_in()).await;

        assert_eq!(store.get().access_token(), Some("A1"));
        assert!(!secure.has_secret("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_location_keeps_tokens() {
        let secure = Arc::new(MockSecureStore::default());
        let store = store_with(secure);
        store.set(signed_in()).await;

        let session = store
            .update_location(Some(Location::new(-1.28, 36.81)))
            .await;

        assert_eq!(session.access_token(), Some("A1"));
        assert_eq!(session.location, Some(Location::new(-1.28, 36.81)));
        assert_eq!(store.get(), session);
    }

    #[tokio::test]
    async fn test_subscribe_sees_replacements() {
        let store = store_with(Arc::new(MockSecureStore::default()));
        let mut rx = store.subscribe();

        store.set(signed_in()).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().access_token(), Some("A1"));

        store.clear().await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_restore_loads_record() {
        let secure = Arc::new(MockSecureStore::default());
        store_with(secure.clone()).set(signed_in()).await;

        let fresh = store_with(secure);
        assert!(fresh.get().is_empty());

        let restored = fresh.restore().await;
        assert_eq!(restored, Some(signed_in()));
        assert_eq!(fresh.get(), signed_in());
    }

    #[tokio::test]
    async fn test_restore_discards_corrupted_record() {
        let secure = Arc::new(MockSecureStore::default());
        secure.set_secret("user", b"{broken").await.unwrap();
        let store = store_with(secure.clone());

        assert_eq!(store.restore().await, None);
        assert!(store.get().is_empty());
        assert!(!secure.has_secret("user").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let store = store_with(Arc::new(MockSecureStore::default()));
        store.set(signed_in()).await;

        let a = store.clone();
        let b = store.clone();
        let (_, _) = tokio::join!(
            a.update(|s| s.email = Some("first@example.com".to_string())),
            b.update(|s| s.location = Some(Location::new(1.0, 2.0))),
        );

        let session = store.get();
        assert_eq!(session.email.as_deref(), Some("first@example.com"));
        assert_eq!(session.location, Some(Location::new(1.0, 2.0)));
    }
}
