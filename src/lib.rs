// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storefront-Auth: credential and session management for the storefront.
//!
//! This crate provides the authentication backend: email/password and
//! OAuth logins, short-lived access tokens and rotating refresh sessions.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::UserStore;
use services::{AuthService, OAuthClients};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn UserStore>,
    pub auth: AuthService,
    pub oauth: OAuthClients,
}

impl AppState {
    /// Wire every service over `store`.
    pub fn new(config: Config, store: Arc<dyn UserStore>) -> Result<Self, error::AppError> {
        let auth = AuthService::new(&config, store.clone())?;
        let oauth = OAuthClients::from_config(&config)?;
        Ok(Self {
            config,
            store,
            auth,
            oauth,
        })
    }
}
