// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth start/callback route tests.
//!
//! The provider is replaced by a local axum server that implements the token
//! and userinfo endpoints, so the full redirect flow runs without network.

use axum::{
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use storefront_auth::config::{Config, OAuthClientConfig};
use storefront_auth::db::{MemoryUserStore, UserStore};
use storefront_auth::models::AuthProvider;
use storefront_auth::routes::create_router;
use storefront_auth::services::oauth::DEFAULT_HTTP_TIMEOUT;
use storefront_auth::services::{OAuthClient, ProviderEndpoints};
use storefront_auth::AppState;

mod common;
use common::{
    cookie_pair, create_test_app, find_cookie, get_request, get_with_cookie, send,
    set_cookie_headers,
};

/// Serve a fake provider; returns its base URL.
async fn fake_provider(token_status: StatusCode, userinfo: Value, token_delay: Duration) -> String {
    let app = Router::new()
        .route(
            "/token",
            post(move || async move {
                tokio::time::sleep(token_delay).await;
                (token_status, Json(json!({ "access_token": "provider-token" })))
            }),
        )
        .route(
            "/userinfo",
            get(move || {
                let userinfo = userinfo.clone();
                async move { Json(userinfo) }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// App whose Google client talks to the fake provider.
async fn app_with_fake_google(
    token_status: StatusCode,
    userinfo: Value,
) -> (Router, Arc<MemoryUserStore>) {
    app_with_slow_google(token_status, userinfo, Duration::ZERO, DEFAULT_HTTP_TIMEOUT).await
}

async fn app_with_slow_google(
    token_status: StatusCode,
    userinfo: Value,
    token_delay: Duration,
    timeout: Duration,
) -> (Router, Arc<MemoryUserStore>) {
    let base = fake_provider(token_status, userinfo, token_delay).await;
    let config = Config::test_default();
    let store = Arc::new(MemoryUserStore::new());

    let mut state = AppState::new(config, store.clone()).unwrap();
    let client = OAuthClient::with_endpoints(
        AuthProvider::Google,
        OAuthClientConfig {
            client_id: "test-google-client".to_string(),
            client_secret: "test-google-secret".to_string(),
            callback_url: "http://localhost:5000/auth/google/callback".to_string(),
        },
        ProviderEndpoints {
            authorize_url: format!("{base}/authorize"),
            token_url: format!("{base}/token"),
            userinfo_url: format!("{base}/userinfo"),
            scope: "openid email profile",
        },
        timeout,
    )
    .unwrap();
    state.oauth.insert(client);

    (create_router(Arc::new(state)), store)
}

fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// A started flow: the signed `state` and the cookie that binds it.
struct StartedFlow {
    state: String,
    cookie: String,
}

/// Start the flow and pull the signed `state` out of the redirect.
async fn start_flow(app: &Router) -> StartedFlow {
    let response = send(app, get_request("/auth/google", None)).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = location(&response);
    let encoded = location
        .split('&')
        .find_map(|p| p.strip_prefix("state="))
        .unwrap();
    let cookie = find_cookie(&set_cookie_headers(&response), "oauthState");
    StartedFlow {
        state: urlencoding::decode(encoded).unwrap().into_owned(),
        cookie: cookie_pair(&cookie),
    }
}

fn callback_uri(code: &str, state: &str) -> String {
    format!(
        "/auth/google/callback?code={}&state={}",
        urlencoding::encode(code),
        urlencoding::encode(state)
    )
}

/// Return to the callback from the browser that started `flow`.
async fn finish_flow(app: &Router, flow: &StartedFlow, code: &str) -> Response {
    send(
        app,
        get_with_cookie(&callback_uri(code, &flow.state), &flow.cookie),
    )
    .await
}

#[tokio::test]
async fn test_start_redirects_to_google() {
    let (app, _state, _store) = create_test_app();
    let response = send(&app, get_request("/auth/google", None)).await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = location(&response);
    assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(location.contains("client_id=test-google-client"));
    assert!(location.contains("state="));
}

#[tokio::test]
async fn test_start_sets_state_cookie() {
    let (app, _state, _store) = create_test_app();
    let response = send(&app, get_request("/auth/google", None)).await;

    let cookie = find_cookie(&set_cookie_headers(&response), "oauthState");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=600"));

    let state = location(&response)
        .split('&')
        .find_map(|p| p.strip_prefix("state="))
        .map(|s| urlencoding::decode(s).unwrap().into_owned())
        .unwrap();
    assert_eq!(cookie_pair(&cookie), format!("oauthState={state}"));
}

#[tokio::test]
async fn test_start_unknown_or_unconfigured_provider() {
    let (app, _state, _store) = create_test_app();

    let response = send(&app, get_request("/auth/github", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Facebook is not configured in the test config.
    let response = send(&app, get_request("/auth/facebook", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_callback_provider_error_redirects() {
    let (app, _state, _store) = create_test_app();
    let response = send(
        &app,
        get_request("/auth/google/callback?error=access_denied", None),
    )
    .await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=oauth_failed"
    );
}

#[tokio::test]
async fn test_callback_rejects_forged_state() {
    let (app, _state, _store) = create_test_app();
    let response = send(
        &app,
        get_with_cookie(&callback_uri("code", "Zm9yZ2Vk"), "oauthState=Zm9yZ2Vk"),
    )
    .await;

    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=invalid_state"
    );
}

#[tokio::test]
async fn test_callback_requires_state() {
    let (app, _state, _store) = create_test_app();
    let response = send(&app, get_request("/auth/google/callback?code=abc", None)).await;
    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=invalid_state"
    );
}

#[tokio::test]
async fn test_callback_without_state_cookie_is_rejected() {
    let (app, store) = app_with_fake_google(
        StatusCode::OK,
        json!({ "id": "g-560", "email": "victim@example.com", "verified_email": true }),
    )
    .await;

    // A valid state minted for someone else's browser, replayed without its cookie.
    let flow = start_flow(&app).await;
    let response = send(&app, get_request(&callback_uri("auth-code", &flow.state), None)).await;

    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=invalid_state"
    );
    assert!(find_cookie(&set_cookie_headers(&response), "oauthState").contains("Max-Age=0"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_callback_with_other_flows_cookie_is_rejected() {
    let (app, store) = app_with_fake_google(
        StatusCode::OK,
        json!({ "id": "g-561", "email": "victim@example.com", "verified_email": true }),
    )
    .await;

    let attacker = start_flow(&app).await;
    let victim = start_flow(&app).await;
    let response = send(
        &app,
        get_with_cookie(&callback_uri("auth-code", &attacker.state), &victim.cookie),
    )
    .await;

    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=invalid_state"
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_full_callback_creates_account_and_session() {
    let (app, store) = app_with_fake_google(
        StatusCode::OK,
        json!({
            "id": "g-555",
            "email": "Quinn@Example.com",
            "verified_email": true,
            "name": "Quinn",
            "picture": "https://example.com/q.png"
        }),
    )
    .await;

    let flow = start_flow(&app).await;
    let response = finish_flow(&app, &flow, "auth-code").await;

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = location(&response);
    assert!(
        location.starts_with("http://localhost:5173/auth/callback?token="),
        "{location}"
    );
    let cookies = set_cookie_headers(&response);
    assert!(find_cookie(&cookies, "refreshToken").contains("HttpOnly"));
    assert!(find_cookie(&cookies, "oauthState").contains("Max-Age=0"));

    let user = store
        .find_by_email("quinn@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.google_id.as_deref(), Some("g-555"));
    assert_eq!(user.auth_provider, AuthProvider::Google);
    assert!(user.email_verified);
    assert_eq!(user.refresh_tokens.len(), 1);

    // Second login resolves to the same account.
    let flow = start_flow(&app).await;
    finish_flow(&app, &flow, "auth-code").await;
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_callback_without_email_redirects_missing_email() {
    let (app, store) = app_with_fake_google(
        StatusCode::OK,
        json!({ "id": "g-556", "name": "No Mail" }),
    )
    .await;

    let flow = start_flow(&app).await;
    let response = finish_flow(&app, &flow, "auth-code").await;

    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=missing_email"
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_callback_token_exchange_failure() {
    let (app, store) = app_with_fake_google(StatusCode::BAD_REQUEST, json!({})).await;

    let flow = start_flow(&app).await;
    let response = finish_flow(&app, &flow, "bad-code").await;

    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=oauth_failed"
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_callback_times_out_on_slow_provider() {
    let (app, store) = app_with_slow_google(
        StatusCode::OK,
        json!({ "id": "g-557", "email": "slow@example.com" }),
        Duration::from_secs(5),
        Duration::from_millis(200),
    )
    .await;

    let flow = start_flow(&app).await;
    let started = std::time::Instant::now();
    let response = finish_flow(&app, &flow, "auth-code").await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        location(&response),
        "http://localhost:5173/auth/login?error=oauth_failed"
    );
    assert!(store.is_empty());
}
