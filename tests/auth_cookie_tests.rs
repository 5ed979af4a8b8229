// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh cookie attribute tests.
//!
//! These tests verify that the cookie cleared on logout carries the same
//! attributes as the cookie set on login, in development and production.

use axum::http::StatusCode;
use serde_json::json;
use storefront_auth::config::Config;

mod common;
use common::{
    body_json, create_test_app, create_test_app_with_config, find_cookie, post_json, register,
    send, set_cookie_headers,
};

#[tokio::test]
async fn test_login_cookie_attributes_development() {
    let (app, _state, _store) = create_test_app();
    let response = register(&app, "Alice", "alice@example.com", "Secret123!").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = find_cookie(&set_cookie_headers(&response), "refreshToken");
    assert!(cookie.contains("HttpOnly"), "{cookie}");
    assert!(cookie.contains("SameSite=Strict"), "{cookie}");
    assert!(cookie.contains("Path=/"), "{cookie}");
    assert!(cookie.contains("Max-Age=604800"), "{cookie}");
    assert!(!cookie.contains("Secure"), "{cookie}");
}

#[tokio::test]
async fn test_cookie_secure_in_production() {
    let mut config = Config::test_default();
    config.production = true;
    let (app, _state, _store) = create_test_app_with_config(config);

    let response = register(&app, "Alice", "alice@example.com", "Secret123!").await;
    let cookie = find_cookie(&set_cookie_headers(&response), "refreshToken");
    assert!(cookie.contains("Secure"), "{cookie}");
}

#[tokio::test]
async fn test_max_age_follows_refresh_ttl() {
    let mut config = Config::test_default();
    config.refresh_token_ttl = std::time::Duration::from_secs(3600);
    let (app, _state, _store) = create_test_app_with_config(config);

    let response = register(&app, "Alice", "alice@example.com", "Secret123!").await;
    let cookie = find_cookie(&set_cookie_headers(&response), "refreshToken");
    assert!(cookie.contains("Max-Age=3600"), "{cookie}");
}

#[tokio::test]
async fn test_logout_cookie_removal_matches_creation_attributes() {
    let mut config = Config::test_default();
    config.production = true;
    let (app, _state, _store) = create_test_app_with_config(config);

    let response = register(&app, "Alice", "alice@example.com", "Secret123!").await;
    let set = find_cookie(&set_cookie_headers(&response), "refreshToken");
    let pair = set.split(';').next().unwrap().to_string();
    let token = body_json(response).await["accessToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = send(
        &app,
        post_json("/auth/logout", json!({}), Some(&pair), Some(&token)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cleared = find_cookie(&set_cookie_headers(&response), "refreshToken");
    assert!(cleared.starts_with("refreshToken=;"), "{cleared}");
    assert!(cleared.contains("Max-Age=0"), "{cleared}");
    for attribute in ["HttpOnly", "SameSite=Strict", "Path=/", "Secure"] {
        assert!(cleared.contains(attribute), "missing {attribute}: {cleared}");
    }
}

#[tokio::test]
async fn test_rejected_refresh_clears_cookie() {
    let (app, _state, _store) = create_test_app();

    let response = send(
        &app,
        post_json(
            "/auth/refresh",
            json!({}),
            Some("refreshToken=not-a-real-token"),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cleared = find_cookie(&set_cookie_headers(&response), "refreshToken");
    assert!(cleared.contains("Max-Age=0"), "{cleared}");
}
