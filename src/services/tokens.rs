// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access/refresh token codec.
//!
//! Both token kinds are HS256 JWTs with the same claim shape. They are signed
//! with different secrets, so a token of one kind never verifies as the other.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Role, User};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity attributes carried inside a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl From<&User> for TokenPayload {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// JWT claims structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub payload: TokenPayload,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Token ID; keeps two tokens minted in the same second distinct
    pub jti: String,
}

/// Which secret/lifetime pair a token uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl KeyPair {
    fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }
}

/// Mints and verifies access and refresh tokens.
///
/// Stateless: built once from [`Config`] and shared by every request.
pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenCodec {
    pub fn new(config: &Config) -> Self {
        Self::with_secrets(
            &config.jwt_access_secret,
            &config.jwt_refresh_secret,
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    pub fn with_secrets(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        validation.leeway = 0;

        Self {
            access: KeyPair::new(access_secret, access_ttl),
            refresh: KeyPair::new(refresh_secret, refresh_ttl),
            validation,
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Validity window of the given token kind.
    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.keys(kind).ttl
    }

    /// Sign a token for `payload` as of `now` with the given token ID.
    ///
    /// Pure: identical inputs give an identical token.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        payload: &TokenPayload,
        now: DateTime<Utc>,
        jti: &str,
    ) -> Result<String, AppError> {
        let keys = self.keys(kind);
        let iat = u64::try_from(now.timestamp())
            .map_err(|_| anyhow::anyhow!("Clock is before the Unix epoch"))?;

        let exp = iat
            .checked_add(keys.ttl.as_secs())
            .ok_or_else(|| anyhow::anyhow!("Token expiry overflows: ttl {:?}", keys.ttl))?;

        let claims = Claims {
            payload: payload.clone(),
            iat,
            exp,
            jti: jti.to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
    }

    /// Sign a token as of now with a fresh token ID.
    pub fn issue(&self, kind: TokenKind, payload: &TokenPayload) -> Result<String, AppError> {
        self.issue_at(
            kind,
            payload,
            Utc::now(),
            &uuid::Uuid::new_v4().to_string(),
        )
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, AppError> {
        self.issue(TokenKind::Access, &TokenPayload::from(user))
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, AppError> {
        self.issue(TokenKind::Refresh, &TokenPayload::from(user))
    }

    pub fn issue_access_token_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
        jti: &str,
    ) -> Result<String, AppError> {
        self.issue_at(TokenKind::Access, &TokenPayload::from(user), now, jti)
    }

    pub fn issue_refresh_token_at(
        &self,
        user: &User,
        now: DateTime<Utc>,
        jti: &str,
    ) -> Result<String, AppError> {
        self.issue_at(TokenKind::Refresh, &TokenPayload::from(user), now, jti)
    }

    /// Decode and validate signature and expiry.
    ///
    /// Expired tokens give [`AppError::TokenExpired`]; anything else that fails
    /// gives [`AppError::TokenInvalid`].
    pub fn verify(&self, kind: TokenKind, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.keys(kind).decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                _ => AppError::TokenInvalid,
            })
    }

    pub fn verify_access_token(&self, token: &str) -> Result<TokenPayload, AppError> {
        self.verify(TokenKind::Access, token).map(|c| c.payload)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<TokenPayload, AppError> {
        self.verify(TokenKind::Refresh, token).map(|c| c.payload)
    }
}
