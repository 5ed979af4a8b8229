// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session orchestration.
//!
//! Ties the credential verifier, OAuth linker, token codec and refresh
//! session store together into the flows the HTTP layer exposes:
//! login → token pair, refresh → rotation, logout → revocation.

use crate::config::Config;
use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{AuthProvider, OAuthProfile, User};
use crate::services::credentials::CredentialVerifier;
use crate::services::linker::OAuthIdentityLinker;
use crate::services::password::PasswordHasher;
use crate::services::sessions::RefreshSessionStore;
use crate::services::tokens::{TokenCodec, TokenKind, TokenPayload};
use std::sync::Arc;

/// Access + refresh token issued together.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// An authenticated user and the session just opened for them.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub tokens: TokenPair,
}

/// The credential and session manager.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenCodec,
    credentials: CredentialVerifier,
    linker: OAuthIdentityLinker,
    sessions: RefreshSessionStore,
}

impl AuthService {
    pub fn new(config: &Config, store: Arc<dyn UserStore>) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(config.password_cost)?;
        Ok(Self {
            tokens: TokenCodec::new(config),
            credentials: CredentialVerifier::new(store.clone(), hasher),
            linker: OAuthIdentityLinker::new(store.clone()),
            sessions: RefreshSessionStore::new(store.clone()),
            store,
        })
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn sessions(&self) -> &RefreshSessionStore {
        &self.sessions
    }

    /// Mint a token pair for `user` and record the refresh token.
    async fn open_session(&self, user: User) -> Result<Session, AppError> {
        let payload = TokenPayload::from(&user);
        let tokens = TokenPair {
            access_token: self.tokens.issue(TokenKind::Access, &payload)?,
            refresh_token: self.tokens.issue(TokenKind::Refresh, &payload)?,
        };
        self.sessions.save(&user.id, &tokens.refresh_token).await?;
        Ok(Session { user, tokens })
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<Session, AppError> {
        let user = self.credentials.register(name, email, password).await?;
        self.open_session(user).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        let user = self.credentials.login(email, password).await?;
        self.open_session(user).await
    }

    /// Log in with a provider-asserted profile.
    pub async fn oauth_login(
        &self,
        profile: &OAuthProfile,
        provider: AuthProvider,
    ) -> Result<Session, AppError> {
        let user = self.linker.find_or_create(profile, provider).await?;
        if !user.is_active {
            tracing::info!(user_id = %user.id, reason = "deactivated", "OAuth login rejected");
            return Err(AppError::AccountDeactivated);
        }
        self.open_session(user).await
    }

    /// Exchange a refresh token for a new pair, revoking the presented one.
    ///
    /// The token must verify and must still be in the owner's stored set; a
    /// revoked or already-rotated token is rejected even before it expires.
    /// Removal from the set is the membership check, so a token can be
    /// rotated at most once however many requests race on it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let payload = self.tokens.verify_refresh_token(refresh_token)?;

        let Some(user) = self.store.find_by_id(&payload.user_id).await? else {
            tracing::warn!(user_id = %payload.user_id, "Refresh token for unknown user");
            return Err(AppError::TokenInvalid);
        };

        if !self.sessions.remove(&user.id, refresh_token).await? {
            tracing::warn!(user_id = %user.id, "Rejected revoked or replayed refresh token");
            return Err(AppError::TokenInvalid);
        }

        if !user.is_active {
            tracing::info!(user_id = %user.id, reason = "deactivated", "Refresh rejected");
            return Err(AppError::AccountDeactivated);
        }

        let user_id = user.id.clone();
        let session = self.open_session(user).await?;

        tracing::info!(user_id = %user_id, "Refresh token rotated");
        Ok(session.tokens)
    }

    /// Revoke the single presented refresh token.
    pub async fn logout(&self, user_id: &str, refresh_token: &str) -> Result<(), AppError> {
        let revoked = self.sessions.remove(user_id, refresh_token).await?;
        tracing::info!(user_id, revoked, "Logged out one session");
        Ok(())
    }

    /// Revoke every refresh token of the user.
    pub async fn logout_all(&self, user_id: &str) -> Result<(), AppError> {
        self.sessions.revoke_all(user_id).await
    }

    /// Change a local password; revokes every session.
    pub async fn change_password(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        self.credentials
            .change_password(user_id, current_password, new_password)
            .await
    }

    /// Resolve the current user by id (`getUserById`); never goes through
    /// the OAuth linker.
    pub async fn current_user(&self, user_id: &str) -> Result<User, AppError> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
    }
}

/// Session-affinity key for a user.
pub fn serialize(user: &User) -> String {
    user.id.clone()
}

/// Resolve a session-affinity key back to the user, if it still exists.
pub async fn deserialize(store: &dyn UserStore, id: &str) -> Result<Option<User>, AppError> {
    store.find_by_id(id).await
}
