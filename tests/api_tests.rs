//! HTTP API tests
//!
//! Drive the router in-process with `tower::ServiceExt::oneshot` over
//! in-memory stores.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use tower::ServiceExt;

use psyfi_server::auth::crypto::address_from_verifying_key;
use psyfi_server::auth::{sign_personal_message, AuthBackends, AuthService, WalletAddress};
use psyfi_server::config::{AuthSettings, StoreSettings};
use psyfi_server::routes::create_router;
use psyfi_server::state::AppState;
use psyfi_server::store::{MemoryCache, MemoryIdentityRepository, MemorySessionRepository};

fn app() -> Router {
    let backends = AuthBackends {
        cache: Arc::new(MemoryCache::new()),
        identities: Arc::new(MemoryIdentityRepository::new()),
        sessions: Arc::new(MemorySessionRepository::new()),
    };
    let service = AuthService::new(backends, &AuthSettings::default(), &StoreSettings::default());
    create_router(AppState::new(Arc::new(service)))
}

fn wallet(seed: u8) -> (SigningKey, WalletAddress) {
    let key = SigningKey::from_slice(&[seed; 32]).unwrap();
    let address = address_from_verifying_key(key.verifying_key());
    (key, address)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn with_bearer(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    request
}

/// Nonce + sign + connect, returning the connect response body
async fn connect(app: &Router, key: &SigningKey, address: &str, extra: Value) -> (StatusCode, Value) {
    let (status, nonce) = send(app, get(&format!("/auth/nonce/{}", address))).await;
    assert_eq!(status, StatusCode::OK);

    let message = nonce["message"].as_str().unwrap().to_string();
    let mut body = json!({
        "walletAddress": address,
        "signature": sign_personal_message(key, &message).unwrap(),
        "message": message,
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            body.insert(k.clone(), v.clone());
        }
    }

    send(app, json_request(Method::POST, "/auth/connect", body)).await
}

#[tokio::test]
async fn test_root_and_health() {
    let app = app();

    let response = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["cache"], "connected");
}

#[tokio::test]
async fn test_nonce_response_shape() {
    let app = app();
    let (status, body) = send(
        &app,
        get("/auth/nonce/0xABCDEF0000000000000000000000000000000001"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let message = body["message"].as_str().unwrap();
    let nonce = body["nonce"].as_str().unwrap();
    assert!(message.contains(nonce));
    assert!(message.contains(&format!("Timestamp: {}", body["timestamp"])));
    assert!(message.to_lowercase().contains("0xabcdef0000000000000000000000000000000001"));
}

#[tokio::test]
async fn test_nonce_rejects_bad_address() {
    let (status, body) = send(&app(), get("/auth/nonce/not-a-wallet")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ADDRESS_FORMAT");
}

#[tokio::test]
async fn test_connect_profile_refresh_disconnect() {
    let app = app();
    let (key, address) = wallet(41);

    let (status, body) = connect(&app, &key, address.as_str(), json!({ "username": "alice" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["walletAddress"], address.as_str());
    assert_eq!(body["user"]["username"], "alice");

    let session_id = body["sessionId"].as_str().unwrap().to_string();
    let access = body["tokens"]["accessToken"].as_str().unwrap().to_string();
    let refresh = body["tokens"]["refreshToken"].as_str().unwrap().to_string();

    let (status, profile) = send(&app, with_bearer(get("/auth/profile"), &access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["username"], "alice");

    let (status, refreshed) = send(
        &app,
        json_request(Method::POST, "/auth/refresh", json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(refreshed["accessToken"].is_string());
    assert!(refreshed.get("refreshToken").is_none());

    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/disconnect")
            .header("x-session-id", &session_id)
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/auth/refresh", json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "SESSION_REVOKED");
}

#[tokio::test]
async fn test_connect_with_wrong_key() {
    let app = app();
    let (_, address) = wallet(42);
    let (other_key, _) = wallet(43);

    let (status, body) = connect(&app, &other_key, address.as_str(), json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_connect_with_malformed_signature() {
    let app = app();
    let (_, address) = wallet(44);
    let (_, nonce) = send(&app, get(&format!("/auth/nonce/{}", address))).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/connect",
            json!({
                "walletAddress": address.as_str(),
                "signature": "0xdeadbeef",
                "message": nonce["message"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MALFORMED_SIGNATURE");
}

#[tokio::test]
async fn test_connect_validates_email() {
    let app = app();
    let (key, address) = wallet(45);

    let (status, body) = connect(&app, &key, address.as_str(), json!({ "email": "nope" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_connect_rejects_malformed_json() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/connect")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_disconnect_without_header_succeeds() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/disconnect")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app(), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_profile_requires_bearer() {
    let app = app();

    let (status, body) = send(&app, get("/auth/profile")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, body) = send(&app, with_bearer(get("/auth/profile"), "garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_profile_rejects_refresh_token() {
    let app = app();
    let (key, address) = wallet(46);
    let (_, body) = connect(&app, &key, address.as_str(), json!({})).await;
    let refresh = body["tokens"]["refreshToken"].as_str().unwrap();

    let (status, body) = send(&app, with_bearer(get("/auth/profile"), refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn test_update_preferences() {
    let app = app();
    let (key, address) = wallet(47);
    let (_, body) = connect(&app, &key, address.as_str(), json!({})).await;
    let access = body["tokens"]["accessToken"].as_str().unwrap().to_string();

    let request = with_bearer(
        json_request(
            Method::PUT,
            "/auth/preferences",
            json!({
                "preferences": {
                    "theme": "dark",
                    "currency": "USD",
                    "notifications": { "email": true, "priceAlerts": true },
                    "dashboardLayout": "compact"
                }
            }),
        ),
        &access,
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["preferences"]["theme"], "dark");
    assert_eq!(body["preferences"]["notifications"]["priceAlerts"], true);
    assert_eq!(body["preferences"]["dashboardLayout"], "compact");

    let (_, profile) = send(&app, with_bearer(get("/auth/profile"), &access)).await;
    assert_eq!(profile["user"]["preferences"]["currency"], "USD");
}

#[tokio::test]
async fn test_update_preferences_rejects_invalid_document() {
    let app = app();
    let (key, address) = wallet(48);
    let (_, body) = connect(&app, &key, address.as_str(), json!({})).await;
    let access = body["tokens"]["accessToken"].as_str().unwrap().to_string();

    let request = with_bearer(
        json_request(
            Method::PUT,
            "/auth/preferences",
            json!({ "preferences": { "currency": "dollars" } }),
        ),
        &access,
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
