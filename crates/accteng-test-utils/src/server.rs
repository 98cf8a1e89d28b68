use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use accteng_core::config::EngineConfig;
use accteng_server::{EngineState, Sequencer, build_router};

use crate::stores::{TestStores, create_test_stores};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";
pub const TEST_PASSWORD: &str = "hunter2-test-password";
pub const TEST_DID: &str = "did:web:test.pds.local";
pub const TEST_HANDLE: &str = "alice.test.pds.local";

/// Build the `EngineConfig` this crate's other helpers assume: one account,
/// a throwaway signing key, `TEST_PASSWORD` as its bcrypt hash.
pub fn create_test_config() -> EngineConfig {
    let signing_key =
        accteng_crypto::SigningKey::generate_p256().expect("failed to generate test signing key");
    let password_hash =
        accteng_crypto::hash_password(TEST_PASSWORD).expect("failed to hash test password");

    EngineConfig {
        did: TEST_DID.to_string(),
        handle: TEST_HANDLE.to_string(),
        pds_hostname: "test.pds.local".to_string(),
        port: 0,
        signing_key: hex::encode(signing_key.to_bytes()),
        signing_key_public: signing_key.did_key(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        auth_token: "test-auth-token".to_string(),
        password_hash: Some(password_hash),
        blobs: None,
        initial_active: true,
        database_url: String::new(), // not used; stores are pre-connected
        appview_url: None,
        appview_did: None,
        relay_url: None,
        tls: None,
        oauth: Default::default(),
    }
}

/// Wire up an `EngineState` over pre-connected test stores, with the
/// singleton account and genesis repo already lazily initialized.
pub async fn create_test_engine_state(stores: &TestStores) -> EngineState {
    let sequencer = Sequencer::new(1, 256);

    let mut state = EngineState::new(
        Arc::new(stores.account_store.clone()),
        Arc::new(stores.repo_store.clone()),
        Arc::new(stores.blob_store.clone()),
        Arc::new(stores.oauth_store.clone()),
        Arc::new(create_test_config()),
    );
    state.sequencer = Some(sequencer);
    state.event_store = Some(stores.event_store_arc());

    accteng_server::ensure_account(&state)
        .await
        .expect("failed to lazily initialize test account");

    state
}

pub async fn create_test_router(stores: &TestStores) -> Router {
    let state = create_test_engine_state(stores).await;
    build_router(state)
}

pub async fn create_test_router_and_stores() -> (Router, TestStores) {
    let stores = create_test_stores().await;
    let router = create_test_router(&stores).await;
    (router, stores)
}

/// Log into the one account this engine hosts and return
/// `(did, access_jwt, refresh_jwt)`.
pub async fn login(router: &Router) -> (String, String, String) {
    let body = serde_json::json!({
        "identifier": TEST_DID,
        "password": TEST_PASSWORD,
    });

    let (status, json) = send_request(
        router,
        "POST",
        "/xrpc/com.atproto.server.createSession",
        None,
        Some(body),
    )
    .await;
    assert_eq!(status, 200, "createSession failed: {json}");

    let did = json["did"].as_str().unwrap().to_string();
    let access_jwt = json["accessJwt"].as_str().unwrap().to_string();
    let refresh_jwt = json["refreshJwt"].as_str().unwrap().to_string();

    (did, access_jwt, refresh_jwt)
}

/// Send a request through the router and return (status, body_json).
pub async fn send_request(
    router: &Router,
    method: &str,
    uri: &str,
    auth_token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    let req_body = match body {
        Some(b) => Body::from(serde_json::to_vec(&b).unwrap()),
        None => Body::empty(),
    };

    let req = builder.body(req_body).unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status().as_u16();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };

    (status, json)
}
