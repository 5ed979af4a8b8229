// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token authentication and role authorization middleware.

use crate::error::AppError;
use crate::models::Role;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Authenticated user extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that requires a valid access token.
///
/// Responds `token_expired` for an expired token so clients know to refresh,
/// and `invalid_token` for anything else that fails verification.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request).ok_or(AppError::Unauthorized)?;
    let payload = state.auth.tokens().verify_access_token(token)?;

    let auth_user = AuthUser {
        user_id: payload.user_id,
        email: payload.email,
        role: payload.role,
    };
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Middleware that allows only the given roles. Must run after [`require_auth`].
///
/// ```ignore
/// .route_layer(middleware::from_fn(move |req, next| {
///     require_role(&[Role::Admin], req, next)
/// }))
/// ```
pub async fn require_role(
    allowed: &'static [Role],
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AppError::Unauthorized)?;

    if !allowed.contains(&user.role) {
        tracing::info!(user_id = %user.user_id, role = %user.role, "Role not permitted");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}
