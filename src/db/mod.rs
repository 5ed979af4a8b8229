// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity store layer.
//!
//! The auth core only talks to [`UserStore`]. Refresh-token mutations are
//! atomic field updates in every implementation; no method rewrites a whole
//! record.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreUserStore;
pub use memory::MemoryUserStore;

use crate::error::AppError;
use crate::models::{AuthProvider, NewUser, ProviderLink, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Email uniqueness index (document ID = lowercased email)
    pub const USER_EMAILS: &str = "user_emails";
    /// OAuth identity uniqueness index (document ID = `{provider}_{provider_id}`)
    pub const USER_PROVIDER_IDS: &str = "user_provider_ids";
}

/// Persistent user-record store used by the auth core.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError>;

    /// Persist a new identity.
    ///
    /// Fails with [`AppError::DuplicateAccount`] if the email or a provider
    /// id is already taken.
    async fn create(&self, user: NewUser) -> Result<User, AppError>;

    /// Append a refresh token to the user's set.
    async fn append_refresh_token(&self, id: &str, token: &str) -> Result<(), AppError>;

    /// Remove one refresh token.
    ///
    /// Returns `true` only for the call that actually took the token out of
    /// the set; an absent token or unknown user gives `false`. Concurrent
    /// calls for the same token see exactly one `true`.
    async fn remove_refresh_token(&self, id: &str, token: &str) -> Result<bool, AppError>;

    /// Remove every refresh token. A no-op for an unknown user.
    async fn clear_refresh_tokens(&self, id: &str) -> Result<(), AppError>;

    async fn update_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Write the linker-owned fields of an existing record.
    async fn apply_provider_link(&self, id: &str, link: &ProviderLink) -> Result<(), AppError>;

    /// Replace the password hash and revoke every refresh token in one write.
    async fn set_password_hash(&self, id: &str, hash: &str) -> Result<(), AppError>;
}
