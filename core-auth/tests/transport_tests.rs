//! End-to-end behaviour of the authenticated transport against a fake backend.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::SecureStore;
use bytes::Bytes;
use core_auth::{
    ApiRequest, AuthError, AuthenticatedTransport, Session, SessionPersistence, SessionStore,
};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const BASE_URL: &str = "https://haki.test/api";

#[derive(Default)]
struct MemorySecureStore {
    storage: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        self.storage
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.storage.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage.lock().unwrap().remove(key);
        Ok(())
    }
}

/// API routes accept only `accepted_token`; `/refresh` replays scripted replies.
#[derive(Default)]
struct FakeBackend {
    accepted_token: Option<String>,
    refresh_replies: Mutex<VecDeque<BridgeResult<HttpResponse>>>,
    refresh_calls: AtomicUsize,
    refresh_delay: Duration,
    refresh_started: Notify,
    refresh_gate: Option<Notify>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeBackend {
    fn accepting(token: &str) -> Self {
        Self {
            accepted_token: Some(token.to_string()),
            ..Default::default()
        }
    }

    fn rejecting_everything() -> Self {
        Self::default()
    }

    fn refresh_reply(self, status: u16, body: &str) -> Self {
        self.refresh_replies
            .lock()
            .unwrap()
            .push_back(Ok(reply(status, body)));
        self
    }

    fn refresh_error(self, error: BridgeError) -> Self {
        self.refresh_replies.lock().unwrap().push_back(Err(error));
        self
    }

    fn refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    fn gated(mut self) -> Self {
        self.refresh_gate = Some(Notify::new());
        self
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn api_requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.url.ends_with("/refresh"))
            .cloned()
            .collect()
    }

    fn refresh_requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with("/refresh"))
            .cloned()
            .collect()
    }
}

fn reply(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if request.url.ends_with("/refresh") {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_started.notify_one();
            if let Some(gate) = &self.refresh_gate {
                gate.notified().await;
            }
            if !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            return self
                .refresh_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(reply(500, "no scripted refresh")));
        }

        let authorized = match (&self.accepted_token, request.header_value("authorization")) {
            (Some(token), Some(header)) => header == format!("Bearer {}", token),
            _ => false,
        };

        if authorized {
            Ok(reply(200, r#"{"id":5}"#))
        } else {
            Ok(reply(401, r#"{"detail":"Token has expired"}"#))
        }
    }
}

struct Harness {
    backend: Arc<FakeBackend>,
    secure: Arc<MemorySecureStore>,
    store: SessionStore,
    transport: AuthenticatedTransport,
    events: EventBus,
}

impl Harness {
    async fn new(backend: FakeBackend, session: Session) -> Self {
        let backend = Arc::new(backend);
        let secure = Arc::new(MemorySecureStore::default());
        let store = SessionStore::new(SessionPersistence::new(secure.clone(), "user"));
        store.set(session).await;

        let events = EventBus::new(32);
        let config = core_runtime::ClientConfig::builder()
            .base_url(BASE_URL)
            .http_client(backend.clone())
            .secure_store(secure.clone())
            .build()
            .unwrap();
        let transport = AuthenticatedTransport::from_config(&config, store.clone(), events.clone());

        Self {
            backend,
            secure,
            store,
            transport,
            events,
        }
    }

    async fn persisted(&self) -> Option<Session> {
        SessionPersistence::new(self.secure.clone(), "user")
            .load()
            .await
            .unwrap()
    }
}

fn tokens(access: Option<&str>, refresh: Option<&str>) -> Session {
    Session {
        access_token: access.map(str::to_string),
        refresh_token: refresh.map(str::to_string),
        email: Some("amina@example.com".to_string()),
        location: None,
    }
}

#[tokio::test]
async fn test_refresh_and_retry_succeeds() {
    let backend = FakeBackend::accepting("A2").refresh_reply(200, r#"{"access_token":"A2"}"#);
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let response = harness.transport.get("/protests").await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.data, serde_json::json!({ "id": 5 }));

    let session = harness.store.get();
    assert_eq!(session.access_token(), Some("A2"));
    assert_eq!(session.refresh_token(), Some("R1"));
    assert_eq!(session.email.as_deref(), Some("amina@example.com"));
    assert_eq!(harness.persisted().await, Some(session));

    assert_eq!(harness.backend.refresh_calls(), 1);
    let refresh = &harness.backend.refresh_requests()[0];
    assert_eq!(refresh.url, format!("{}/refresh", BASE_URL));
    assert_eq!(refresh.header_value("authorization"), Some("Bearer R1"));
    assert!(refresh.body.is_none());

    let sent = harness.backend.api_requests();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].header_value("authorization"), Some("Bearer A1"));
    assert_eq!(sent[1].header_value("authorization"), Some("Bearer A2"));
}

#[tokio::test]
async fn test_refresh_rejected_clears_session() {
    let backend = FakeBackend::accepting("A2").refresh_reply(403, r#"{"detail":"revoked"}"#);
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;
    let mut events = harness.events.subscribe();

    let err = harness.transport.get("/protests").await.unwrap_err();

    assert!(matches!(err, AuthError::RefreshFailed { .. }));
    assert!(err.requires_sign_in());
    assert!(harness.store.get().is_empty());
    assert_eq!(harness.persisted().await, None);
    assert_eq!(harness.backend.api_requests().len(), 1);

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::TokenRefreshing)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::SessionExpired {
            reason: "refresh_failed".to_string()
        })
    );
}

#[tokio::test]
async fn test_refresh_network_error_clears_session() {
    let backend = FakeBackend::accepting("A2")
        .refresh_error(BridgeError::Timeout(Duration::from_secs(10)));
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let err = harness.transport.get("/protests").await.unwrap_err();

    assert!(matches!(err, AuthError::RefreshFailed { .. }));
    assert!(harness.store.get().is_empty());
    assert_eq!(harness.persisted().await, None);
}

#[tokio::test]
async fn test_missing_refresh_token_clears_without_refreshing() {
    let backend = FakeBackend::accepting("A2");
    let harness = Harness::new(backend, tokens(Some("A1"), None)).await;
    let mut events = harness.events.subscribe();

    let err = harness.transport.get("/protests").await.unwrap_err();

    assert!(matches!(err, AuthError::NoRefreshToken));
    assert_eq!(harness.backend.refresh_calls(), 0);
    assert!(harness.store.get().is_empty());
    assert_eq!(harness.persisted().await, None);
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::SessionExpired {
            reason: "no_refresh_token".to_string()
        })
    );
}

#[tokio::test]
async fn test_second_401_is_returned_without_another_refresh() {
    let backend = FakeBackend::rejecting_everything()
        .refresh_reply(200, r#"{"access_token":"A2"}"#)
        .refresh_reply(200, r#"{"access_token":"A3"}"#);
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let response = harness.transport.get("/protests").await.unwrap();

    assert_eq!(response.status, 401);
    assert_eq!(response.error_detail().as_deref(), Some("Token has expired"));
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert_eq!(harness.backend.api_requests().len(), 2);
    assert_eq!(harness.store.get().access_token(), Some("A2"));
}

#[tokio::test]
async fn test_rotated_refresh_token_is_adopted() {
    let backend = FakeBackend::accepting("A2")
        .refresh_reply(200, r#"{"access_token":"A2","refresh_token":"R2"}"#);
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;
    let mut events = harness.events.subscribe();

    harness.transport.get("/protests").await.unwrap();

    let session = harness.store.get();
    assert_eq!(session.refresh_token(), Some("R2"));
    assert_eq!(harness.persisted().await.unwrap().refresh_token(), Some("R2"));

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::TokenRefreshing)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::TokenRefreshed { rotated: true })
    );
}

#[tokio::test]
async fn test_refresh_token_retained_across_repeated_refreshes() {
    let backend = FakeBackend::rejecting_everything()
        .refresh_reply(200, r#"{"access_token":"A2"}"#)
        .refresh_reply(200, r#"{"access_token":"A3"}"#);
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    harness.transport.get("/protests").await.unwrap();
    assert_eq!(harness.store.get().refresh_token(), Some("R1"));

    harness.transport.get("/protests").await.unwrap();
    let session = harness.store.get();
    assert_eq!(session.access_token(), Some("A3"));
    assert_eq!(session.refresh_token(), Some("R1"));

    let refreshes = harness.backend.refresh_requests();
    assert_eq!(refreshes.len(), 2);
    assert!(refreshes
        .iter()
        .all(|r| r.header_value("authorization") == Some("Bearer R1")));
}

#[tokio::test]
async fn test_unauthenticated_request_can_refresh() {
    let backend = FakeBackend::accepting("A2").refresh_reply(200, r#"{"access_token":"A2"}"#);
    let harness = Harness::new(backend, tokens(None, Some("R1"))).await;

    let response = harness.transport.get("/protests").await.unwrap();

    assert_eq!(response.status, 200);
    let sent = harness.backend.api_requests();
    assert!(sent[0].header_value("authorization").is_none());
    assert_eq!(sent[1].header_value("authorization"), Some("Bearer A2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_share_one_refresh() {
    let backend = FakeBackend::accepting("A2")
        .refresh_reply(200, r#"{"access_token":"A2"}"#)
        .refresh_delay(Duration::from_millis(50));
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let calls = (0..8).map(|_| {
        let transport = harness.transport.clone();
        async move { transport.get("/protests").await }
    });
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap().status, 200);
    }
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert_eq!(harness.store.get().access_token(), Some("A2"));
}

#[tokio::test]
async fn test_concurrent_401s_share_one_failed_refresh() {
    let backend = FakeBackend::accepting("A2")
        .refresh_reply(403, r#"{"detail":"revoked"}"#)
        .refresh_delay(Duration::from_millis(50));
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;
    let mut events = harness.events.subscribe();

    let (first, second) = tokio::join!(
        harness.transport.get("/protests"),
        harness.transport.get("/profile"),
    );

    for result in [first, second] {
        match result {
            Err(AuthError::RefreshFailed { reason }) => {
                assert_eq!(reason, "refresh endpoint returned status 403")
            }
            other => panic!("expected RefreshFailed, got {:?}", other.map(|r| r.status)),
        }
    }
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert!(harness.store.get().is_empty());
    assert_eq!(harness.persisted().await, None);

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::TokenRefreshing)
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Auth(AuthEvent::SessionExpired {
            reason: "refresh_failed".to_string()
        })
    );
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_signed_out_request_after_failed_refresh_needs_sign_in() {
    let backend = FakeBackend::accepting("A2").refresh_reply(403, "");
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let first = harness.transport.get("/protests").await.unwrap_err();
    assert!(matches!(first, AuthError::RefreshFailed { .. }));

    let second = harness.transport.get("/protests").await.unwrap_err();
    assert!(matches!(second, AuthError::NoRefreshToken));
    assert_eq!(harness.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_abandoned_request_still_completes_refresh() {
    let backend = FakeBackend::accepting("A2")
        .refresh_reply(200, r#"{"access_token":"A2"}"#)
        .gated();
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;
    let mut changes = harness.store.subscribe();
    changes.borrow_and_update();

    let transport = harness.transport.clone();
    let caller = tokio::spawn(async move { transport.get("/protests").await });

    harness.backend.refresh_started.notified().await;
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    if let Some(gate) = &harness.backend.refresh_gate {
        gate.notify_one();
    }

    tokio::time::timeout(Duration::from_secs(5), changes.changed())
        .await
        .expect("refresh result was discarded")
        .unwrap();

    let session = harness.store.get();
    assert_eq!(session.access_token(), Some("A2"));
    assert_eq!(session.refresh_token(), Some("R1"));
}

#[tokio::test]
async fn test_logout_during_refresh_discards_new_token() {
    let backend = FakeBackend::accepting("A2")
        .refresh_reply(200, r#"{"access_token":"A2"}"#)
        .gated();
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let transport = harness.transport.clone();
    let caller = tokio::spawn(async move { transport.get("/protests").await });

    harness.backend.refresh_started.notified().await;
    harness.store.clear().await;
    if let Some(gate) = &harness.backend.refresh_gate {
        gate.notify_one();
    }

    let err = caller.await.unwrap().unwrap_err();
    assert!(matches!(err, AuthError::RefreshFailed { .. }));
    assert!(harness.store.get().is_empty());
    assert_eq!(harness.persisted().await, None);
}

#[tokio::test]
async fn test_extra_headers_and_raw_body_are_forwarded() {
    let backend = FakeBackend::accepting("A1");
    let harness = Harness::new(backend, tokens(Some("A1"), Some("R1"))).await;

    let request = ApiRequest::post("/upload_image")
        .body(vec![0xFFu8, 0xD8, 0xFF], "image/jpeg")
        .header("X-Upload-Name", "march.jpg");
    let response = harness.transport.request(request).await.unwrap();

    assert_eq!(response.status, 200);
    let sent = &harness.backend.api_requests()[0];
    assert_eq!(sent.url, format!("{}/upload_image", BASE_URL));
    assert_eq!(sent.header_value("content-type"), Some("image/jpeg"));
    assert_eq!(sent.header_value("x-upload-name"), Some("march.jpg"));
    assert_eq!(sent.body.as_deref(), Some([0xFFu8, 0xD8, 0xFF].as_slice()));
}
