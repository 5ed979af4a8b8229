// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! FIRESTORE_EMULATOR_HOST to point at it; otherwise they are skipped.

use chrono::Utc;
use std::sync::Arc;
use storefront_auth::db::UserStore;
use storefront_auth::error::AppError;
use storefront_auth::models::{AuthProvider, NewUser, ProviderLink, Role};

mod common;
use common::test_firestore;

/// Unique email for test isolation.
fn unique_email(tag: &str) -> String {
    format!("{}-{}@example.com", tag, uuid::Uuid::new_v4().simple())
}

fn local_user(email: &str) -> NewUser {
    NewUser {
        name: "Test".to_string(),
        email: email.to_string(),
        password_hash: Some("$argon2id$placeholder".to_string()),
        role: Role::User,
        auth_provider: AuthProvider::Local,
        google_id: None,
        facebook_id: None,
        avatar: None,
        email_verified: false,
        last_login: None,
    }
}

#[tokio::test]
async fn test_create_and_lookup() {
    require_emulator!();

    let store = test_firestore().await;
    let email = unique_email("create");

    assert!(store.find_by_email(&email).await.unwrap().is_none());

    let user = store.create(local_user(&email)).await.unwrap();
    let by_email = store.find_by_email(&email).await.unwrap().unwrap();
    let by_id = store.find_by_id(&user.id).await.unwrap().unwrap();

    assert_eq!(by_email.id, user.id);
    assert_eq!(by_id.email, email);
    assert!(by_id.is_active);
    assert!(by_id.refresh_tokens.is_empty());
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    require_emulator!();

    let store = test_firestore().await;
    let email = unique_email("dup");
    store.create(local_user(&email)).await.unwrap();

    let result = store.create(local_user(&email)).await;
    assert!(matches!(result, Err(AppError::DuplicateAccount)));
}

#[tokio::test]
async fn test_refresh_token_transforms() {
    require_emulator!();

    let store = test_firestore().await;
    let user = store
        .create(local_user(&unique_email("tokens")))
        .await
        .unwrap();

    store.append_refresh_token(&user.id, "t1").await.unwrap();
    store.append_refresh_token(&user.id, "t2").await.unwrap();
    assert!(store.remove_refresh_token(&user.id, "t1").await.unwrap());
    assert!(!store.remove_refresh_token(&user.id, "t1").await.unwrap());
    assert!(!store.remove_refresh_token(&user.id, "never-added").await.unwrap());

    let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_tokens, vec!["t2".to_string()]);

    store.clear_refresh_tokens(&user.id).await.unwrap();
    let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
    assert!(stored.refresh_tokens.is_empty());
}

#[tokio::test]
async fn test_concurrent_appends_are_not_lost() {
    require_emulator!();

    let store = Arc::new(test_firestore().await);
    let user = store
        .create(local_user(&unique_email("concurrent")))
        .await
        .unwrap();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let store = store.clone();
            let id = user.id.clone();
            tokio::spawn(async move { store.append_refresh_token(&id, &format!("t{i}")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.refresh_tokens.len(), 5);
}

#[tokio::test]
async fn test_provider_link_preserves_tokens_and_hash() {
    require_emulator!();

    let store = test_firestore().await;
    let user = store
        .create(local_user(&unique_email("link")))
        .await
        .unwrap();
    store.append_refresh_token(&user.id, "keep-me").await.unwrap();

    let google_id = format!("g-{}", uuid::Uuid::new_v4().simple());
    store
        .apply_provider_link(
            &user.id,
            &ProviderLink {
                attach: Some((AuthProvider::Google, google_id.clone())),
                auth_provider: Some(AuthProvider::Google),
                last_login: Utc::now(),
            },
        )
        .await
        .unwrap();

    let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.google_id.as_deref(), Some(google_id.as_str()));
    assert_eq!(stored.auth_provider, AuthProvider::Google);
    assert!(stored.email_verified);
    assert_eq!(stored.password_hash, user.password_hash);
    assert_eq!(stored.refresh_tokens, vec!["keep-me".to_string()]);

    let by_provider = store
        .find_by_provider_id(AuthProvider::Google, &google_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_provider.id, user.id);
}

#[tokio::test]
async fn test_set_password_hash_clears_sessions() {
    require_emulator!();

    let store = test_firestore().await;
    let user = store
        .create(local_user(&unique_email("password")))
        .await
        .unwrap();
    store.append_refresh_token(&user.id, "t1").await.unwrap();

    store
        .set_password_hash(&user.id, "$argon2id$new")
        .await
        .unwrap();

    let stored = store.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.password_hash.as_deref(), Some("$argon2id$new"));
    assert!(stored.refresh_tokens.is_empty());
}

#[tokio::test]
async fn test_concurrent_removals_report_one_winner() {
    require_emulator!();

    let store = Arc::new(test_firestore().await);
    let user = store
        .create(local_user(&unique_email("race")))
        .await
        .unwrap();
    store.append_refresh_token(&user.id, "shared").await.unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            let id = user.id.clone();
            tokio::spawn(async move { store.remove_refresh_token(&id, "shared").await })
        })
        .collect();

    let mut removed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            removed += 1;
        }
    }
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_writes_to_unknown_user_do_not_create_records() {
    require_emulator!();

    let store = test_firestore().await;
    let id = format!("missing-{}", uuid::Uuid::new_v4().simple());

    assert!(matches!(
        store.append_refresh_token(&id, "t").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        store.update_last_login(&id, Utc::now()).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        store.set_password_hash(&id, "$argon2id$x").await,
        Err(AppError::NotFound(_))
    ));
    assert!(!store.remove_refresh_token(&id, "t").await.unwrap());
    store.clear_refresh_tokens(&id).await.unwrap();

    // No partial document was upserted.
    assert!(store.find_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_provider_id_reservation_is_unique() {
    require_emulator!();

    let store = test_firestore().await;
    let google_id = format!("g-{}", uuid::Uuid::new_v4().simple());

    let mut first = local_user(&unique_email("p1"));
    first.google_id = Some(google_id.clone());
    store.create(first).await.unwrap();

    let mut second = local_user(&unique_email("p2"));
    second.google_id = Some(google_id);
    assert!(matches!(
        store.create(second).await,
        Err(AppError::DuplicateAccount)
    ));
}
