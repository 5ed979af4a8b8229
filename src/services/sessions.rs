// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Refresh session tracking.
//!
//! A refresh token is only honoured while it is in the owner's stored set.
//! Every change here is a single atomic store operation.

use crate::db::UserStore;
use crate::error::AppError;
use std::sync::Arc;

/// Tracks the live refresh tokens of each user.
#[derive(Clone)]
pub struct RefreshSessionStore {
    store: Arc<dyn UserStore>,
}

impl RefreshSessionStore {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Record a newly issued refresh token.
    pub async fn save(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        self.store.append_refresh_token(user_id, token).await
    }

    /// Revoke one refresh token.
    ///
    /// Returns whether the token was still live. Of several concurrent calls
    /// with the same token, only one gets `true`.
    pub async fn remove(&self, user_id: &str, token: &str) -> Result<bool, AppError> {
        self.store.remove_refresh_token(user_id, token).await
    }

    /// Revoke every refresh token of the user.
    pub async fn revoke_all(&self, user_id: &str) -> Result<(), AppError> {
        self.store.clear_refresh_tokens(user_id).await?;
        tracing::info!(user_id, "All refresh sessions revoked");
        Ok(())
    }
}
