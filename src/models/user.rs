// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User identity model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Authorization role embedded in every issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
    Seller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Seller => "seller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an account is allowed to log in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    #[default]
    Local,
    Google,
    Facebook,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "local",
            AuthProvider::Google => "google",
            AuthProvider::Facebook => "facebook",
        }
    }

    /// Parse an OAuth provider from a route segment. `local` is not an OAuth provider.
    pub fn from_oauth_name(name: &str) -> Option<Self> {
        match name {
            "google" => Some(AuthProvider::Google),
            "facebook" => Some(AuthProvider::Facebook),
            _ => None,
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User identity stored in the identity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque unique identifier (also used as document ID)
    pub id: String,
    /// Display name
    pub name: String,
    /// Lowercased, unique email address
    pub email: String,
    /// PHC-format Argon2id hash; absent for pure-OAuth accounts
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub auth_provider: AuthProvider,
    #[serde(default)]
    pub google_id: Option<String>,
    #[serde(default)]
    pub facebook_id: Option<String>,
    /// Profile picture URL
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    pub is_active: bool,
    /// Currently valid refresh tokens, one per live session
    #[serde(default)]
    pub refresh_tokens: Vec<String>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// External id stored for the given provider, if any.
    pub fn provider_id(&self, provider: AuthProvider) -> Option<&str> {
        match provider {
            AuthProvider::Local => None,
            AuthProvider::Google => self.google_id.as_deref(),
            AuthProvider::Facebook => self.facebook_id.as_deref(),
        }
    }

    pub fn has_refresh_token(&self, token: &str) -> bool {
        self.refresh_tokens.iter().any(|t| t == token)
    }
}

/// Fields for creating a new identity. The store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: Role,
    pub auth_provider: AuthProvider,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub avatar: Option<String>,
    pub email_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl NewUser {
    /// Build the stored record for this identity.
    pub fn into_user(self, id: String, now: DateTime<Utc>) -> User {
        User {
            id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            auth_provider: self.auth_provider,
            google_id: self.google_id,
            facebook_id: self.facebook_id,
            avatar: self.avatar,
            email_verified: self.email_verified,
            is_active: true,
            refresh_tokens: Vec::new(),
            last_login: self.last_login,
            created_at: now,
        }
    }
}

/// Partial update written by the OAuth linker onto an existing record.
///
/// Only these fields are written so concurrent refresh-token updates survive.
/// Applying a link always marks the email verified.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderLink {
    /// Provider id to attach, when the record had none for this provider
    pub attach: Option<(AuthProvider, String)>,
    /// New `auth_provider` value, when a local account is being upgraded
    pub auth_provider: Option<AuthProvider>,
    pub last_login: DateTime<Utc>,
}

/// Public user profile returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub email_verified: bool,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            avatar: user.avatar.clone(),
            email_verified: user.email_verified,
        }
    }
}

/// Canonical form of an email used for every lookup and create.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
