// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Reconciles OAuth provider profiles with local identities.
//!
//! Email is the merge key across providers: a profile whose email matches an
//! existing account is linked to it. Only use profiles from providers that
//! verify email ownership themselves.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{normalize_email, AuthProvider, NewUser, OAuthProfile, ProviderLink, Role, User};
use chrono::Utc;
use std::sync::Arc;

/// Name used when the provider sends no display name.
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Finds or creates the local identity for an OAuth login.
#[derive(Clone)]
pub struct OAuthIdentityLinker {
    store: Arc<dyn UserStore>,
}

impl OAuthIdentityLinker {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    pub async fn find_or_create(
        &self,
        profile: &OAuthProfile,
        provider: AuthProvider,
    ) -> Result<User, AppError> {
        if provider == AuthProvider::Local {
            return Err(AppError::Validation(
                "local is not an OAuth provider".to_string(),
            ));
        }

        let email = profile
            .primary_email()
            .map(normalize_email)
            .ok_or(AppError::MissingProviderEmail)?;

        if profile.id.trim().is_empty() {
            return Err(AppError::Validation(
                "OAuth profile has no provider id".to_string(),
            ));
        }

        if let Some(user) = self.store.find_by_email(&email).await? {
            return self.link_existing(user, profile, provider).await;
        }

        // The provider may report a different email than the one we stored
        // for this identity; the provider id still identifies the account.
        if let Some(user) = self.store.find_by_provider_id(provider, &profile.id).await? {
            tracing::info!(user_id = %user.id, provider = %provider, "Provider email changed, matched by provider id");
            return self.link_existing(user, profile, provider).await;
        }

        self.create(email, profile, provider).await
    }

    async fn link_existing(
        &self,
        mut user: User,
        profile: &OAuthProfile,
        provider: AuthProvider,
    ) -> Result<User, AppError> {
        // Never overwrite an existing link for this provider.
        let attach = match user.provider_id(provider) {
            Some(_) => None,
            None => Some((provider, profile.id.clone())),
        };
        // First OAuth login converts a local account; the password hash stays.
        let upgrade = (user.auth_provider == AuthProvider::Local).then_some(provider);

        let link = ProviderLink {
            attach,
            auth_provider: upgrade,
            last_login: Utc::now(),
        };
        self.store.apply_provider_link(&user.id, &link).await?;

        if let Some((provider, provider_id)) = link.attach {
            match provider {
                AuthProvider::Google => user.google_id = Some(provider_id),
                AuthProvider::Facebook => user.facebook_id = Some(provider_id),
                AuthProvider::Local => {}
            }
            tracing::info!(user_id = %user.id, provider = %provider, "Linked OAuth identity");
        }
        if let Some(provider) = link.auth_provider {
            tracing::info!(user_id = %user.id, provider = %provider, "Upgraded local account to OAuth");
            user.auth_provider = provider;
        }
        user.email_verified = true;
        user.last_login = Some(link.last_login);

        Ok(user)
    }

    async fn create(
        &self,
        email: String,
        profile: &OAuthProfile,
        provider: AuthProvider,
    ) -> Result<User, AppError> {
        let provider_id = Some(profile.id.clone());

        let user = self
            .store
            .create(NewUser {
                name: profile.name().unwrap_or(DEFAULT_DISPLAY_NAME).to_string(),
                email,
                password_hash: None,
                role: Role::User,
                auth_provider: provider,
                google_id: provider_id.clone().filter(|_| provider == AuthProvider::Google),
                facebook_id: provider_id.filter(|_| provider == AuthProvider::Facebook),
                avatar: profile.primary_photo().map(str::to_string),
                email_verified: true,
                last_login: Some(Utc::now()),
            })
            .await?;

        tracing::info!(user_id = %user.id, provider = %provider, "Created account from OAuth profile");
        Ok(user)
    }
}
