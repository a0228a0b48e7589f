//! End-to-end session flows against a mock portal backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use warden_auth::{
    AuthError, OAuthConfig, PendingApprovalPoller, PkceEngine, Role, SessionManager,
    SessionState, SessionStore,
};
use warden_client::PortalClient;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REDIRECT_URI: &str = "http://localhost:8765/callback";

fn client_for(server: &MockServer) -> PortalClient {
    PortalClient::builder()
        .base_url(server.uri())
        .build()
        .unwrap()
}

fn manager_with_store(server: &MockServer, store: SessionStore) -> SessionManager {
    SessionManager::new(client_for(server), store)
}

fn pkce_engine() -> PkceEngine {
    PkceEngine::in_memory(OAuthConfig::new(
        "https://sso.example.com",
        "soc",
        "soc-portal",
        REDIRECT_URI,
    ))
}

fn token(value: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"access_token": value, "token_type": "bearer"}))
}

fn claims(email: &str, roles: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "sub": "42",
        "email": email,
        "roles": roles,
    }))
}

async fn mount_me(server: &MockServer, bearer: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/auth/kc/me"))
        .and(header("authorization", format!("Bearer {}", bearer).as_str()))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_analyst_sign_in() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "pw"})))
        .respond_with(token("T1"))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["soc_analyst"]))).await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    let mut identities = session.subscribe();

    let identity = session.sign_in("a@x.com", "pw", None).await.unwrap();
    assert_eq!(identity.role, Role::Analyst);
    assert_eq!(identity.email, "a@x.com");
    assert_eq!(session.state(), SessionState::Authenticated);

    let caps = session.capabilities().unwrap();
    assert!(caps.can_view_reports);
    assert!(!caps.can_create_tickets);

    assert_eq!(store.read_token().await.unwrap().as_deref(), Some("T1"));
    assert!(identities.has_changed().unwrap());
    assert_eq!(
        identities.borrow_and_update().as_ref().map(|i| i.role),
        Some(Role::Analyst)
    );
}

#[tokio::test]
async fn test_second_factor_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "OTP required"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "pw", "otp": "123456"})))
        .respond_with(token("T2"))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "T2", claims("a@x.com", json!(["client"]))).await;

    let session = manager_with_store(&server, SessionStore::memory());

    let err = session.sign_in("a@x.com", "pw", None).await.unwrap_err();
    assert!(matches!(err, AuthError::SecondFactorRequired(ref m) if m == "OTP required"));
    assert!(session.second_factor_hint());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.current_user().is_none());

    let identity = session
        .sign_in("a@x.com", "pw", Some("123456"))
        .await
        .unwrap();
    assert_eq!(identity.role, Role::Client);
    assert!(!session.second_factor_hint());
}

#[tokio::test]
async fn test_bad_password_is_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid credentials"})),
        )
        .mount(&server)
        .await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    let err = session.sign_in("a@x.com", "nope", None).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidCredentials(_)));
    assert_eq!(err.user_message(), "Invalid credentials");
    assert!(!session.second_factor_hint());
    assert!(store.read_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_claims_failure_after_login_clears_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    mount_me(&server, "T1", ResponseTemplate::new(500).set_body_json(json!({"detail": "boom"}))).await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    let err = session.sign_in("a@x.com", "pw", None).await.unwrap_err();

    assert!(matches!(err, AuthError::Backend(ref m) if m == "boom"));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(store.read_token().await.unwrap().is_none());
    assert!(!session.client().transport().has_token_accessor());
}

#[tokio::test]
async fn test_expired_token_on_restore() {
    let server = MockServer::start().await;
    mount_me(
        &server,
        "stale",
        ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})),
    )
    .await;

    let store = SessionStore::memory();
    store.set_token("stale").await.unwrap();
    let session = manager_with_store(&server, store.clone());

    let err = session.restore().await.unwrap_err();
    assert!(matches!(err, AuthError::SessionExpired(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.current_user().is_none());
    assert!(store.read_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_picks_up_stored_token() {
    let server = MockServer::start().await;
    mount_me(&server, "T9", claims("boss@x.com", json!(["soc_admin", "soc_client"]))).await;

    let store = SessionStore::memory();
    store.set_token("T9").await.unwrap();
    let session = manager_with_store(&server, store);

    let identity = session.restore().await.unwrap().unwrap();
    assert_eq!(identity.role, Role::Admin);
    assert_eq!(session.state(), SessionState::Authenticated);
    assert!(session.capabilities().unwrap().can_review_role_requests);

    // Already authenticated: no second claims fetch needed.
    assert_eq!(session.restore().await.unwrap(), Some(identity));
}

#[tokio::test]
async fn test_restore_network_failure_clears_token() {
    let store = SessionStore::memory();
    store.set_token("T1").await.unwrap();
    let client = PortalClient::builder()
        .base_url("http://127.0.0.1:9")
        .build()
        .unwrap();
    let session = SessionManager::new(client, store.clone());

    let err = session.restore().await.unwrap_err();
    assert!(matches!(err, AuthError::Network(_)));
    assert_eq!(err.user_message(), "Network error");
    assert!(store.read_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_sign_in_is_busy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1").set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["analyst"]))).await;

    let session = manager_with_store(&server, SessionStore::memory());
    let (first, second) = tokio::join!(
        session.sign_in("a@x.com", "pw", None),
        session.sign_in("a@x.com", "pw", None),
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(AuthError::SessionBusy)));
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_sign_in_again_replaces_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "a@x.com", "password": "pw"})))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "m@x.com", "password": "pw"})))
        .respond_with(token("T2"))
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["analyst"]))).await;
    mount_me(&server, "T2", claims("m@x.com", json!(["manager"]))).await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    session.sign_in("a@x.com", "pw", None).await.unwrap();
    let identity = session.sign_in("m@x.com", "pw", None).await.unwrap();

    assert_eq!(identity.role, Role::Manager);
    assert_eq!(store.read_token().await.unwrap().as_deref(), Some("T2"));
}

#[tokio::test]
async fn test_sign_out_clears_even_when_backend_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["client"]))).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    session.sign_in("a@x.com", "pw", None).await.unwrap();
    let mut identities = session.subscribe();

    session.sign_out().await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.current_user().is_none());
    assert!(store.read_token().await.unwrap().is_none());
    assert!(identities.borrow_and_update().is_none());
}

async fn wait_for_idle(session: &SessionManager) {
    for _ in 0..100 {
        if session.state() == SessionState::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session stuck in {}", session.state());
}

#[tokio::test]
async fn test_cancelled_sign_in_leaves_nothing_to_restore() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    mount_me(
        &server,
        "T1",
        claims("root@x.com", json!(["soc_admin"])).set_delay(Duration::from_millis(500)),
    )
    .await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    let attempt = tokio::time::timeout(
        Duration::from_millis(100),
        session.sign_in("root@x.com", "pw", None),
    )
    .await;
    assert!(attempt.is_err());

    wait_for_idle(&session).await;
    assert!(session.current_user().is_none());
    assert!(store.read_token().await.unwrap().is_none());

    let fresh = manager_with_store(&server, store.clone());
    assert!(fresh.restore().await.unwrap().is_none());
    assert_eq!(fresh.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_cancelled_sign_out_still_clears_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["client"]))).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let store = SessionStore::memory();
    let session = manager_with_store(&server, store.clone());
    session.sign_in("a@x.com", "pw", None).await.unwrap();

    let signed_out = tokio::time::timeout(Duration::from_millis(100), session.sign_out()).await;
    assert!(signed_out.is_err());

    wait_for_idle(&session).await;
    assert!(session.current_user().is_none());
    assert!(store.read_token().await.unwrap().is_none());
    assert!(!session.client().transport().has_token_accessor());
}

#[tokio::test]
async fn test_sign_out_sends_bearer_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["client"]))).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = manager_with_store(&server, SessionStore::memory());
    session.sign_in("a@x.com", "pw", None).await.unwrap();
    session.sign_out().await.unwrap();
    assert!(!session.client().transport().has_token_accessor());
}

#[tokio::test]
async fn test_callback_exchange_sends_verifier() {
    let server = MockServer::start().await;
    let pkce = pkce_engine();
    pkce.login_url().await.unwrap();
    let verifier = pkce.ensure_challenge().await.unwrap().verifier;

    Mock::given(method("POST"))
        .and(path("/auth/kc/exchange"))
        .and(body_json(json!({
            "code": "the-code",
            "code_verifier": verifier,
            "redirect_uri": REDIRECT_URI,
        })))
        .respond_with(token("T3"))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "T3", claims("a@x.com", json!(["soc_manager"]))).await;

    let session = manager_with_store(&server, SessionStore::memory()).with_pkce(pkce);
    let identity = session.complete_callback("the-code").await.unwrap();

    assert_eq!(identity.role, Role::Manager);
    let pkce = session.pkce().unwrap();
    assert!(pkce.take_verifier().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_exchange_discards_verifier() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/kc/exchange"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"detail": "Code not valid"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pkce = pkce_engine();
    pkce.login_url().await.unwrap();
    let session = manager_with_store(&server, SessionStore::memory()).with_pkce(pkce);

    let err = session.complete_callback("bad").await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidCredentials(ref m) if m == "Code not valid"));

    // A second attempt with the same redirect has nothing to exchange with.
    let err = session.complete_callback("bad").await.unwrap_err();
    assert!(matches!(err, AuthError::MissingVerifier));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_custom_exchange_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/exchange"))
        .respond_with(token("T4"))
        .expect(1)
        .mount(&server)
        .await;
    mount_me(&server, "T4", claims("a@x.com", json!([]))).await;

    let pkce = pkce_engine();
    pkce.register_url().await.unwrap();
    let session = manager_with_store(&server, SessionStore::memory())
        .with_pkce(pkce)
        .with_exchange_path("api/oauth/exchange");

    assert_eq!(session.complete_callback("c").await.unwrap().role, Role::Client);
}

#[tokio::test]
async fn test_role_requests_follow_capabilities() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(token("T1"))
        .mount(&server)
        .await;
    mount_me(&server, "T1", claims("a@x.com", json!(["analyst"]))).await;
    Mock::given(method("POST"))
        .and(path("/api/roles/request"))
        .and(body_json(json!({"role": "manager"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 5,
            "user_id": 42,
            "requested_role": "manager",
            "status": "pending"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = manager_with_store(&server, SessionStore::memory());
    session.sign_in("a@x.com", "pw", None).await.unwrap();

    let requests = session.role_requests().unwrap();
    let created = requests
        .submit(warden_client::RequestableRole::Manager)
        .await
        .unwrap();
    assert_eq!(created.id, 5);
    assert!(matches!(
        requests.pending_count().await,
        Err(AuthError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_admin_poller_publishes_count() {
    let server = MockServer::start().await;
    mount_me(&server, "TA", claims("root@x.com", json!(["soc_admin"]))).await;
    Mock::given(method("GET"))
        .and(path("/api/roles/requests/count"))
        .and(query_param("status", "pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 3})))
        .mount(&server)
        .await;

    let store = SessionStore::memory();
    store.set_token("TA").await.unwrap();
    let session = manager_with_store(&server, store);
    session.restore().await.unwrap();

    let poller = PendingApprovalPoller::start(
        Arc::new(session.client().clone()),
        session.subscribe(),
        Duration::from_secs(60),
    )
    .unwrap();
    let mut counts = poller.subscribe();
    tokio::time::timeout(Duration::from_secs(5), counts.wait_for(|c| c.is_some()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(poller.count(), Some(3));

    session.sign_out().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !poller.is_stopped() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
