// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod oauth;
pub mod user;

pub use oauth::{OAuthProfile, ProfileValue};
pub use user::{normalize_email, AuthProvider, NewUser, ProviderLink, Role, User, UserResponse};
