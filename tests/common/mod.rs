// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use std::sync::Arc;
use storefront_auth::config::Config;
use storefront_auth::db::{FirestoreUserStore, MemoryUserStore};
use storefront_auth::models::{OAuthProfile, ProfileValue};
use storefront_auth::routes::create_router;
use storefront_auth::services::AuthService;
use storefront_auth::AppState;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a Firestore store against the emulator.
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreUserStore {
    FirestoreUserStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Auth service over a fresh in-memory store.
#[allow(dead_code)]
pub fn test_auth_service() -> (AuthService, Arc<MemoryUserStore>) {
    let store = Arc::new(MemoryUserStore::new());
    let auth = AuthService::new(&Config::test_default(), store.clone())
        .expect("Failed to build auth service");
    (auth, store)
}

/// Create a test app over an in-memory store.
/// Returns the router, the shared state and the store.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>, Arc<MemoryUserStore>) {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_config(
    config: Config,
) -> (Router, Arc<AppState>, Arc<MemoryUserStore>) {
    let store = Arc::new(MemoryUserStore::new());
    let state =
        Arc::new(AppState::new(config, store.clone()).expect("Failed to build app state"));
    (create_router(state.clone()), state, store)
}

/// Send one request through a clone of the router.
#[allow(dead_code)]
pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

/// JSON POST request, optionally with a cookie and bearer token.
#[allow(dead_code)]
pub fn post_json(
    uri: &str,
    body: serde_json::Value,
    cookie: Option<&str>,
    bearer: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// GET request, optionally with a bearer token.
#[allow(dead_code)]
pub fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

/// GET request carrying a `Cookie` header.
#[allow(dead_code)]
pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

/// `name=value` pair of a Set-Cookie header, ready for a Cookie header.
#[allow(dead_code)]
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_string()
}

/// The refresh cookie from a response, as a `Cookie` header value.
#[allow(dead_code)]
pub fn refresh_cookie_from(response: &Response) -> String {
    cookie_pair(&find_cookie(&set_cookie_headers(response), "refreshToken"))
}

/// Register through the HTTP API; returns the response.
#[allow(dead_code)]
pub async fn register(app: &Router, name: &str, email: &str, password: &str) -> Response {
    send(
        app,
        post_json(
            "/auth/register",
            serde_json::json!({ "name": name, "email": email, "password": password }),
            None,
            None,
        ),
    )
    .await
}

#[allow(dead_code)]
pub async fn login(app: &Router, email: &str, password: &str) -> Response {
    send(
        app,
        post_json(
            "/auth/login",
            serde_json::json!({ "email": email, "password": password }),
            None,
            None,
        ),
    )
    .await
}

/// Provider profile with one email and a display name.
#[allow(dead_code)]
pub fn profile(id: &str, email: Option<&str>, name: Option<&str>) -> OAuthProfile {
    OAuthProfile {
        id: id.to_string(),
        emails: email
            .map(|e| {
                vec![ProfileValue {
                    value: e.to_string(),
                }]
            })
            .unwrap_or_default(),
        display_name: name.map(str::to_string),
        photos: vec![],
    }
}
