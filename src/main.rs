// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storefront-Auth API Server
//!
//! Serves registration, login, OAuth and refresh-session endpoints for the
//! storefront frontend.

use std::sync::Arc;
use storefront_auth::{
    config::{Config, StoreBackend},
    db::{FirestoreUserStore, MemoryUserStore, UserStore},
    AppState,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, production = config.production, "Starting Storefront-Auth API");

    // Initialize the identity store
    let store: Arc<dyn UserStore> = match config.store_backend {
        StoreBackend::Firestore => {
            let store = FirestoreUserStore::new(&config.gcp_project_id).await?;
            tracing::info!(project = %config.gcp_project_id, "Firestore user store initialized");
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; accounts are lost on restart");
            Arc::new(MemoryUserStore::new())
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), store)?);
    tracing::info!(
        google = config.google.is_some(),
        facebook = config.facebook.is_some(),
        "OAuth providers configured"
    );

    // Build router
    let app = storefront_auth::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("storefront_auth=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;
    Ok(())
}
