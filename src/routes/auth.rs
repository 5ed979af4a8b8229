// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: local credentials, OAuth, refresh and logout.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError};

use crate::config::{Config, REFRESH_COOKIE_NAME};
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{AuthProvider, UserResponse};
use crate::routes::ValidatedJson;
use crate::services::Session;
use crate::AppState;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

/// How long an OAuth `state` parameter stays valid.
const OAUTH_STATE_MAX_AGE_MS: i64 = 10 * 60 * 1000;

/// Cookie binding an OAuth `state` to the browser that started the flow.
pub const OAUTH_STATE_COOKIE_NAME: &str = "oauthState";

/// Routes that need no access token.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/{provider}", get(oauth_start))
        .route("/auth/{provider}/callback", get(oauth_callback))
}

/// Routes that require a valid access token.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        .route("/auth/password", post(change_password))
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank", message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Refresh token cookie with the standard attributes.
pub fn refresh_cookie(config: &Config, token: String) -> Cookie<'static> {
    let max_age = time::Duration::try_from(config.refresh_token_ttl).unwrap_or(time::Duration::MAX);
    Cookie::build((REFRESH_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(config.production)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .build()
}

/// Expired refresh cookie; attributes must match [`refresh_cookie`].
pub fn cleared_refresh_cookie(config: &Config) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .secure(config.production)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Short-lived cookie carrying the `state` handed to the provider.
///
/// `SameSite=Lax` so it survives the top-level redirect back from the
/// provider.
pub fn oauth_state_cookie(config: &Config, state: String) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE_NAME, state))
        .path("/auth")
        .http_only(true)
        .secure(config.production)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::milliseconds(OAUTH_STATE_MAX_AGE_MS))
        .build()
}

/// Expired state cookie; attributes must match [`oauth_state_cookie`].
pub fn cleared_oauth_state_cookie(config: &Config) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE_NAME, ""))
        .path("/auth")
        .http_only(true)
        .secure(config.production)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

fn session_response(config: &Config, jar: CookieJar, session: Session) -> (CookieJar, Json<AuthResponse>) {
    let jar = jar.add(refresh_cookie(config, session.tokens.refresh_token));
    let body = AuthResponse {
        user: UserResponse::from(&session.user),
        access_token: session.tokens.access_token,
    };
    (jar, Json(body))
}

/// Create a local account and open a session.
async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>)> {
    let session = state
        .auth
        .register(&body.name, &body.email, &body.password)
        .await?;
    let (jar, body) = session_response(&state.config, jar, session);
    Ok((StatusCode::CREATED, jar, body))
}

/// Email/password login.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>)> {
    let session = state.auth.login(&body.email, &body.password).await?;
    Ok(session_response(&state.config, jar, session))
}

/// Rotate the refresh cookie and mint a new access token.
///
/// A rejected refresh token also clears the cookie.
async fn refresh(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(token) = jar.get(REFRESH_COOKIE_NAME).map(|c| c.value().to_string()) else {
        return AppError::Unauthorized.into_response();
    };

    match state.auth.refresh(&token).await {
        Ok(tokens) => {
            let jar = jar.add(refresh_cookie(&state.config, tokens.refresh_token));
            let body = RefreshResponse {
                access_token: tokens.access_token,
            };
            (jar, Json(body)).into_response()
        }
        Err(e) if e.is_token_error() || matches!(e, AppError::AccountDeactivated) => {
            let jar = jar.add(cleared_refresh_cookie(&state.config));
            (jar, e).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Revoke the presented refresh token only.
async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    if let Some(cookie) = jar.get(REFRESH_COOKIE_NAME) {
        state.auth.logout(&user.user_id, cookie.value()).await?;
    }
    let jar = jar.add(cleared_refresh_cookie(&state.config));
    Ok((jar, Json(MessageResponse { message: "Logged out" })))
}

/// Revoke every refresh token of the caller.
async fn logout_all(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    state.auth.logout_all(&user.user_id).await?;
    let jar = jar.add(cleared_refresh_cookie(&state.config));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out of all sessions",
        }),
    ))
}

/// Change a local password. Ends every session, including this one.
async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<ChangePasswordRequest>,
) -> Result<(CookieJar, Json<MessageResponse>)> {
    state
        .auth
        .change_password(&user.user_id, &body.current_password, &body.new_password)
        .await?;
    let jar = jar.add(cleared_refresh_cookie(&state.config));
    Ok((
        jar,
        Json(MessageResponse {
            message: "Password changed",
        }),
    ))
}

/// Current user profile.
async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let user = state.auth.current_user(&user.user_id).await?;
    Ok(Json(MeResponse {
        user: UserResponse::from(&user),
    }))
}

/// Start OAuth flow - redirect to the provider's consent page.
///
/// The signed `state` is also set as a cookie; the callback only accepts a
/// `state` that matches it.
async fn oauth_start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    let client = AuthProvider::from_oauth_name(&provider)
        .and_then(|p| state.oauth.get(p))
        .ok_or_else(|| AppError::NotFound(format!("OAuth provider {provider}")))?;

    let oauth_state = sign_state(
        client.provider(),
        &state.config.oauth_state_key,
        Utc::now().timestamp_millis(),
    )?;

    tracing::info!(provider = %client.provider(), "Starting OAuth flow");
    let redirect = Redirect::temporary(&client.authorize_url(&oauth_state));
    let jar = jar.add(oauth_state_cookie(&state.config, oauth_state));
    Ok((jar, redirect))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange the code, link the identity, open a session.
///
/// Always answers with a redirect to the frontend.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    let client_url = &state.config.client_url;
    let bound_state = jar
        .get(OAUTH_STATE_COOKIE_NAME)
        .map(|c| c.value().to_string());
    let jar = jar.add(cleared_oauth_state_cookie(&state.config));

    match complete_oauth(&state, &provider, params, bound_state.as_deref()).await {
        Ok(session) => {
            let jar = jar.add(refresh_cookie(&state.config, session.tokens.refresh_token));
            let redirect = format!(
                "{}/auth/callback?token={}",
                client_url,
                urlencoding::encode(&session.tokens.access_token)
            );
            (jar, Redirect::temporary(&redirect)).into_response()
        }
        Err(code) => {
            let redirect = Redirect::temporary(&format!("{client_url}/auth/login?error={code}"));
            (jar, redirect).into_response()
        }
    }
}

/// Run the callback; failures become a redirect error code.
async fn complete_oauth(
    state: &AppState,
    provider: &str,
    params: CallbackParams,
    bound_state: Option<&str>,
) -> std::result::Result<Session, &'static str> {
    let Some(client) = AuthProvider::from_oauth_name(provider).and_then(|p| state.oauth.get(p))
    else {
        tracing::warn!(provider, "OAuth callback for unconfigured provider");
        return Err("oauth_failed");
    };
    let provider = client.provider();

    if let Some(error) = params.error {
        tracing::warn!(provider = %provider, error = %error, "OAuth error from provider");
        return Err("oauth_failed");
    }

    let Some(returned_state) = params.state.as_deref() else {
        tracing::warn!(provider = %provider, "OAuth callback without state");
        return Err("invalid_state");
    };
    let same_browser = bound_state
        .is_some_and(|bound| bool::from(bound.as_bytes().ct_eq(returned_state.as_bytes())));
    if !same_browser {
        tracing::warn!(provider = %provider, "OAuth state not bound to this browser");
        return Err("invalid_state");
    }
    if !verify_state(
        returned_state,
        provider,
        &state.config.oauth_state_key,
        Utc::now().timestamp_millis(),
    ) {
        tracing::warn!(provider = %provider, "Invalid or expired OAuth state");
        return Err("invalid_state");
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Err("oauth_failed");
    };

    let profile = client.fetch_profile(&code).await.map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "OAuth profile fetch failed");
        "oauth_failed"
    })?;

    state
        .auth
        .oauth_login(&profile, provider)
        .await
        .map_err(|e| oauth_error_code(&e))
}

fn oauth_error_code(error: &AppError) -> &'static str {
    match error {
        AppError::MissingProviderEmail => "missing_email",
        AppError::Database(_) | AppError::Internal(_) => {
            tracing::error!(error = %error, "OAuth login failed");
            "server_error"
        }
        _ => {
            tracing::info!(error = %error, "OAuth login rejected");
            "oauth_failed"
        }
    }
}

fn state_mac(key: &[u8], payload: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a signed `state`: base64("provider|nonce|timestamp_hex|signature_hex").
fn sign_state(provider: AuthProvider, key: &[u8], now_ms: i64) -> Result<String> {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let payload = format!("{}|{}|{:x}", provider, nonce, now_ms);
    let signature = state_mac(key, &payload)?;
    let signed = format!("{}|{}", payload, hex::encode(signature));
    Ok(URL_SAFE_NO_PAD.encode(signed.as_bytes()))
}

/// Check signature, provider binding and age of a `state` parameter.
fn verify_state(state: &str, provider: AuthProvider, key: &[u8], now_ms: i64) -> bool {
    let Some(decoded) = URL_SAFE_NO_PAD
        .decode(state)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
    else {
        return false;
    };

    let parts: Vec<&str> = decoded.split('|').collect();
    let [state_provider, nonce, timestamp_hex, signature_hex] = parts[..] else {
        return false;
    };

    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let payload = format!("{}|{}|{}", state_provider, nonce, timestamp_hex);
    let Ok(expected) = state_mac(key, &payload) else {
        return false;
    };
    if !bool::from(expected.ct_eq(&signature)) {
        tracing::error!("OAuth state signature mismatch! Potential tampering.");
        return false;
    }

    if state_provider != provider.as_str() {
        return false;
    }

    let Ok(issued_ms) = i64::from_str_radix(timestamp_hex, 16) else {
        return false;
    };
    let age = now_ms - issued_ms;
    (0..=OAUTH_STATE_MAX_AGE_MS).contains(&age)
}
