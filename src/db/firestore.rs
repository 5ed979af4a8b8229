// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore-backed identity store.
//!
//! Layout:
//! - `users/{id}` holds the [`User`] record
//! - `user_emails/{email}` reserves an email for exactly one user
//! - `user_provider_ids/{provider}_{provider_id}` reserves an OAuth identity
//!
//! Reservation documents are written with an `Exists(false)` precondition in
//! the same transaction as the record they guard, so a lost race surfaces as
//! a commit conflict instead of a duplicate account. Every write to an
//! existing record carries `Exists(true)`; Firestore would otherwise upsert a
//! partial `users/{id}` document for an unknown id. Refresh tokens are changed
//! with array transforms (`arrayUnion` / `arrayRemove`) and never by
//! rewriting the record.

use crate::db::{collections, UserStore};
use crate::error::AppError;
use crate::models::{AuthProvider, NewUser, ProviderLink, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{FirestoreConsistencySelector, FirestoreWritePrecondition};
use serde::{Deserialize, Serialize};

/// Attempts for a token removal whose commit is aborted by contention.
const MAX_TOKEN_TX_ATTEMPTS: usize = 3;

/// Reservation document for a unique value (email or provider id).
#[derive(Debug, Serialize, Deserialize)]
struct Reservation {
    user_id: String,
}

#[derive(Serialize, Deserialize)]
struct LastLoginPatch {
    last_login: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct PasswordPatch {
    password_hash: String,
    refresh_tokens: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct ClearTokens {
    refresh_tokens: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct LinkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    google_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    facebook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auth_provider: Option<AuthProvider>,
    email_verified: bool,
    last_login: DateTime<Utc>,
}

impl LinkPatch {
    fn from_link(link: &ProviderLink) -> Self {
        let (google_id, facebook_id) = match &link.attach {
            Some((AuthProvider::Google, pid)) => (Some(pid.clone()), None),
            Some((AuthProvider::Facebook, pid)) => (None, Some(pid.clone())),
            Some((AuthProvider::Local, _)) | None => (None, None),
        };
        Self {
            google_id,
            facebook_id,
            auth_provider: link.auth_provider,
            email_verified: true,
            last_login: link.last_login,
        }
    }

    /// Field mask matching exactly the fields this patch serializes.
    fn field_mask(&self) -> Vec<&'static str> {
        let mut mask = vec!["email_verified", "last_login"];
        if self.google_id.is_some() {
            mask.push("google_id");
        }
        if self.facebook_id.is_some() {
            mask.push("facebook_id");
        }
        if self.auth_provider.is_some() {
            mask.push("auth_provider");
        }
        mask
    }
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreUserStore {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreUserStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn find_reserved(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<User>, AppError> {
        let reservation: Option<Reservation> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(key)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match reservation {
            Some(r) => self.find_by_id(&r.user_id).await,
            None => Ok(None),
        }
    }

    /// Add `token` to the user's `refresh_tokens` as a single write.
    async fn append_token(&self, id: &str, token: &str) -> Result<(), AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let value = token.to_string();
        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .transforms(|t| {
                t.fields([t
                    .field("refresh_tokens")
                    .append_missing_elements([value.clone()])])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add token transform to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| map_user_write_error(id, e))?;
        Ok(())
    }

    /// One attempt at a conditional token removal.
    ///
    /// The record is read inside the transaction, so a concurrent removal of
    /// the same token aborts one of the two commits.
    async fn try_take_token(
        client: &firestore::FirestoreDb,
        id: &str,
        token: &str,
    ) -> Result<bool, FirestoreError> {
        let mut transaction = client.begin_transaction().await?;

        let user: Option<User> = client
            .clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
                transaction.transaction_id().clone(),
            ))
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await?;

        if !user.is_some_and(|u| u.has_refresh_token(token)) {
            let _ = transaction.rollback().await;
            return Ok(false);
        }

        let value = token.to_string();
        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .transforms(|t| {
                t.fields([t
                    .field("refresh_tokens")
                    .remove_all_from_array([value.clone()])])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)?;

        transaction.commit().await?;
        Ok(true)
    }
}

/// Document ID for a provider reservation.
fn provider_key(provider: AuthProvider, provider_id: &str) -> String {
    format!("{}_{}", provider, urlencoding::encode(provider_id))
}

/// Document ID for an email reservation.
fn email_key(email: &str) -> String {
    urlencoding::encode(email).into_owned()
}

/// Commit conflicts on reservation writes mean the value is already taken.
fn map_commit_error(id: &str, err: FirestoreError) -> AppError {
    match err {
        FirestoreError::DataConflictError(_) => AppError::DuplicateAccount,
        other => map_user_write_error(id, other),
    }
}

/// A failed `Exists(true)` precondition means the user does not exist.
fn map_user_write_error(id: &str, err: FirestoreError) -> AppError {
    match err {
        FirestoreError::DataNotFoundError(_) => AppError::NotFound(format!("User {id} not found")),
        other => AppError::Database(format!("Write failed: {}", other)),
    }
}

/// Aborted commits under contention may be retried.
fn is_retryable(err: &FirestoreError) -> bool {
    matches!(err, FirestoreError::DatabaseError(e) if e.retry_possible)
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.find_reserved(collections::USER_EMAILS, &email_key(email))
            .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        self.find_reserved(
            collections::USER_PROVIDER_IDS,
            &provider_key(provider, provider_id),
        )
        .await
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let client = self.get_client()?;
        let user = new_user.into_user(uuid::Uuid::new_v4().to_string(), Utc::now());
        let reservation = Reservation {
            user_id: user.id.clone(),
        };

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // 1. Reserve the email
        client
            .fluent()
            .update()
            .in_col(collections::USER_EMAILS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(email_key(&user.email))
            .object(&reservation)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add email reservation: {}", e))
            })?;

        // 2. Reserve provider ids, if any
        for provider in [AuthProvider::Google, AuthProvider::Facebook] {
            if let Some(provider_id) = user.provider_id(provider) {
                client
                    .fluent()
                    .update()
                    .in_col(collections::USER_PROVIDER_IDS)
                    .precondition(FirestoreWritePrecondition::Exists(false))
                    .document_id(provider_key(provider, provider_id))
                    .object(&reservation)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!("Failed to add provider reservation: {}", e))
                    })?;
            }
        }

        // 3. The record itself
        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&user.id)
            .object(&user)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add user to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| map_commit_error(&user.id, e))?;

        tracing::debug!(user_id = %user.id, "User record created");
        Ok(user)
    }

    async fn append_refresh_token(&self, id: &str, token: &str) -> Result<(), AppError> {
        self.append_token(id, token).await
    }

    async fn remove_refresh_token(&self, id: &str, token: &str) -> Result<bool, AppError> {
        let client = self.get_client()?;

        let mut attempt = 1;
        loop {
            match Self::try_take_token(client, id, token).await {
                Ok(removed) => return Ok(removed),
                Err(e) if is_retryable(&e) && attempt < MAX_TOKEN_TX_ATTEMPTS => {
                    tracing::debug!(user_id = id, attempt, error = %e, "Retrying token removal");
                    attempt += 1;
                }
                // The record went away between read and commit.
                Err(FirestoreError::DataNotFoundError(_)) => return Ok(false),
                Err(e) => return Err(AppError::Database(format!("Token removal failed: {}", e))),
            }
        }
    }

    async fn clear_refresh_tokens(&self, id: &str) -> Result<(), AppError> {
        let result: Result<(), FirestoreError> = self
            .get_client()?
            .fluent()
            .update()
            .fields(["refresh_tokens"])
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&ClearTokens {
                refresh_tokens: Vec::new(),
            })
            .execute()
            .await;

        match result {
            Ok(()) | Err(FirestoreError::DataNotFoundError(_)) => Ok(()),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn update_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["last_login"])
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&LastLoginPatch { last_login: at })
            .execute()
            .await
            .map_err(|e| map_user_write_error(id, e))?;
        Ok(())
    }

    async fn apply_provider_link(&self, id: &str, link: &ProviderLink) -> Result<(), AppError> {
        let client = self.get_client()?;
        let patch = LinkPatch::from_link(link);

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        if let Some((provider, provider_id)) = &link.attach {
            client
                .fluent()
                .update()
                .in_col(collections::USER_PROVIDER_IDS)
                .precondition(FirestoreWritePrecondition::Exists(false))
                .document_id(provider_key(*provider, provider_id))
                .object(&Reservation {
                    user_id: id.to_string(),
                })
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!("Failed to add provider reservation: {}", e))
                })?;
        }

        client
            .fluent()
            .update()
            .fields(patch.field_mask())
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&patch)
            .add_to_transaction(&mut transaction)
            .map_err(|e| AppError::Database(format!("Failed to add link to transaction: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| map_commit_error(id, e))?;
        Ok(())
    }

    async fn set_password_hash(&self, id: &str, hash: &str) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(["password_hash", "refresh_tokens"])
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&PasswordPatch {
                password_hash: hash.to_string(),
                refresh_tokens: Vec::new(),
            })
            .execute()
            .await
            .map_err(|e| map_user_write_error(id, e))?;
        Ok(())
    }
}
