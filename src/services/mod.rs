// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod credentials;
pub mod linker;
pub mod oauth;
pub mod password;
pub mod sessions;
pub mod tokens;

pub use auth::{AuthService, Session, TokenPair};
pub use credentials::CredentialVerifier;
pub use linker::OAuthIdentityLinker;
pub use oauth::{OAuthClient, OAuthClients, ProviderEndpoints};
pub use password::PasswordHasher;
pub use sessions::RefreshSessionStore;
pub use tokens::{Claims, TokenCodec, TokenKind, TokenPayload};
