// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email/password credential verification.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{normalize_email, AuthProvider, NewUser, Role, User};
use crate::services::password::PasswordHasher;
use chrono::Utc;
use std::sync::Arc;

/// Registers local accounts and checks email/password logins.
#[derive(Clone)]
pub struct CredentialVerifier {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl CredentialVerifier {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Create a new local-provider account.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);

        if self.store.find_by_email(&email).await?.is_some() {
            tracing::info!("Registration rejected: email already registered");
            return Err(AppError::DuplicateAccount);
        }

        let password_hash = self.hasher.hash_blocking(password).await?;

        // The store re-checks uniqueness atomically; the lookup above only
        // avoids hashing for the common duplicate case.
        let user = self
            .store
            .create(NewUser {
                name: name.trim().to_string(),
                email,
                password_hash: Some(password_hash),
                role: Role::User,
                auth_provider: AuthProvider::Local,
                google_id: None,
                facebook_id: None,
                avatar: None,
                email_verified: false,
                last_login: None,
            })
            .await?;

        tracing::info!(user_id = %user.id, "Local account registered");
        Ok(user)
    }

    /// Authenticate an email/password pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);

        let Some(mut user) = self.store.find_by_email(&email).await? else {
            tracing::info!(reason = "unknown_email", "Login rejected");
            return Err(AppError::invalid_credentials());
        };

        if user.auth_provider != AuthProvider::Local {
            tracing::info!(
                user_id = %user.id,
                provider = %user.auth_provider,
                reason = "provider_mismatch",
                "Login rejected"
            );
            return Err(AppError::InvalidCredentials(format!(
                "Please login with {}",
                user.auth_provider.as_str().to_uppercase()
            )));
        }

        let matches = match user.password_hash.as_deref() {
            Some(hash) => self.hasher.verify_blocking(password, hash).await?,
            None => false,
        };
        if !matches {
            tracing::info!(user_id = %user.id, reason = "bad_password", "Login rejected");
            return Err(AppError::invalid_credentials());
        }

        if !user.is_active {
            tracing::info!(user_id = %user.id, reason = "deactivated", "Login rejected");
            return Err(AppError::AccountDeactivated);
        }

        let now = Utc::now();
        self.store.update_last_login(&user.id, now).await?;
        user.last_login = Some(now);

        tracing::info!(user_id = %user.id, "Local login succeeded");
        Ok(user)
    }

    /// Replace a local account's password after checking the current one.
    ///
    /// Every refresh token of the user is revoked in the same store write.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

        let matches = match user.password_hash.as_deref() {
            Some(hash) if user.auth_provider == AuthProvider::Local => {
                self.hasher.verify_blocking(current_password, hash).await?
            }
            _ => false,
        };
        if !matches {
            return Err(AppError::invalid_credentials());
        }

        let new_hash = self.hasher.hash_blocking(new_password).await?;
        self.store.set_password_hash(&user.id, &new_hash).await?;

        tracing::info!(user_id = %user.id, "Password changed, all sessions revoked");
        Ok(())
    }
}
