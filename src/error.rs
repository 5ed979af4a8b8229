// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.
//!
//! Services return these typed failures; only the `IntoResponse` impl below
//! decides on status codes and response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Message is safe to show; it never says which factor failed.
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Account is deactivated")]
    AccountDeactivated,

    #[error("An account with this email already exists")]
    DuplicateAccount,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token expired")]
    TokenExpired,

    #[error("Email not provided by OAuth provider")]
    MissingProviderEmail,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("OAuth provider error: {0}")]
    OAuthProvider(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Generic message used for every local-login credential failure.
    pub const INVALID_CREDENTIALS: &'static str = "Invalid credentials";

    /// Credential failure with the standard generic message.
    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials(Self::INVALID_CREDENTIALS.to_string())
    }

    /// True for either token failure; callers treat both as "re-authenticate".
    pub fn is_token_error(&self) -> bool {
        matches!(self, AppError::TokenInvalid | AppError::TokenExpired)
    }

    /// Short error code used in JSON bodies and OAuth redirect URLs.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::InvalidCredentials(_) => "invalid_credentials",
            AppError::AccountDeactivated => "account_deactivated",
            AppError::DuplicateAccount => "duplicate_account",
            AppError::TokenInvalid => "invalid_token",
            AppError::TokenExpired => "token_expired",
            AppError::MissingProviderEmail => "missing_provider_email",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::OAuthProvider(_) => "oauth_provider_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingProviderEmail => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials(_)
            | AppError::TokenInvalid
            | AppError::TokenExpired
            | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::AccountDeactivated | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DuplicateAccount => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::OAuthProvider(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let message = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{field}: {message}")
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let details = match &self {
            AppError::Validation(msg)
            | AppError::InvalidCredentials(msg)
            | AppError::NotFound(msg) => Some(msg.clone()),
            AppError::AccountDeactivated
            | AppError::DuplicateAccount
            | AppError::MissingProviderEmail => Some(self.to_string()),
            AppError::OAuthProvider(msg) => {
                tracing::warn!(error = %msg, "OAuth provider error");
                None
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                None
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                None
            }
            AppError::TokenInvalid
            | AppError::TokenExpired
            | AppError::Unauthorized
            | AppError::Forbidden => None,
        };

        let body = ErrorResponse {
            error: self.code().to_string(),
            details,
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
