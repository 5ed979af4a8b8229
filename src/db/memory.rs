// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process identity store.
//!
//! Backed by `DashMap`; every mutation happens under the shard lock of the
//! affected record, which gives the same per-field atomicity as the Firestore
//! array transforms. Used by tests and by `USER_STORE=memory`.

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{AuthProvider, NewUser, ProviderLink, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Identity store held entirely in memory.
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
    /// email -> user id
    emails: DashMap<String, String>,
    /// (provider, provider id) -> user id
    provider_ids: DashMap<(AuthProvider, String), String>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Deactivate or reactivate an account. Admin tooling lives outside the
    /// auth core, so this is only exposed on the in-memory store.
    pub fn set_active(&self, id: &str, active: bool) -> Result<(), AppError> {
        self.with_user(id, |user| user.is_active = active)
    }

    /// Change a user's role.
    pub fn set_role(&self, id: &str, role: crate::models::Role) -> Result<(), AppError> {
        self.with_user(id, |user| user.role = role)
    }

    fn with_user<F>(&self, id: &str, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut User),
    {
        let mut user = self
            .users
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;
        f(&mut user);
        Ok(())
    }

    fn lookup(&self, id: Option<String>) -> Option<User> {
        id.and_then(|id| self.users.get(&id).map(|u| u.clone()))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.lookup(self.emails.get(email).map(|id| id.clone())))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_by_provider_id(
        &self,
        provider: AuthProvider,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let key = (provider, provider_id.to_string());
        Ok(self.lookup(self.provider_ids.get(&key).map(|id| id.clone())))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        // Lock order: email entry, then provider entry.
        let email_slot = match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => return Err(AppError::DuplicateAccount),
            Entry::Vacant(slot) => slot,
        };

        let provider_key = [
            (AuthProvider::Google, new_user.google_id.as_ref()),
            (AuthProvider::Facebook, new_user.facebook_id.as_ref()),
        ]
        .into_iter()
        .find_map(|(provider, id)| id.map(|id| (provider, id.clone())));

        let id = uuid::Uuid::new_v4().to_string();

        if let Some(key) = provider_key {
            match self.provider_ids.entry(key) {
                Entry::Occupied(_) => return Err(AppError::DuplicateAccount),
                Entry::Vacant(slot) => {
                    slot.insert(id.clone());
                }
            }
        }

        let user = new_user.into_user(id.clone(), Utc::now());
        self.users.insert(id.clone(), user.clone());
        email_slot.insert(id);

        Ok(user)
    }

    async fn append_refresh_token(&self, id: &str, token: &str) -> Result<(), AppError> {
        self.with_user(id, |user| user.refresh_tokens.push(token.to_string()))
    }

    async fn remove_refresh_token(&self, id: &str, token: &str) -> Result<bool, AppError> {
        let Some(mut user) = self.users.get_mut(id) else {
            return Ok(false);
        };
        let before = user.refresh_tokens.len();
        user.refresh_tokens.retain(|t| t != token);
        Ok(user.refresh_tokens.len() < before)
    }

    async fn clear_refresh_tokens(&self, id: &str) -> Result<(), AppError> {
        if let Some(mut user) = self.users.get_mut(id) {
            user.refresh_tokens.clear();
        }
        Ok(())
    }

    async fn update_last_login(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        self.with_user(id, |user| user.last_login = Some(at))
    }

    async fn apply_provider_link(&self, id: &str, link: &ProviderLink) -> Result<(), AppError> {
        if !self.users.contains_key(id) {
            return Err(AppError::NotFound(format!("User {id} not found")));
        }
        if let Some((provider, provider_id)) = &link.attach {
            match self.provider_ids.entry((*provider, provider_id.clone())) {
                Entry::Occupied(owner) if owner.get() != id => {
                    return Err(AppError::DuplicateAccount)
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(id.to_string());
                }
            }
        }

        self.with_user(id, |user| {
            match &link.attach {
                Some((AuthProvider::Google, pid)) => user.google_id = Some(pid.clone()),
                Some((AuthProvider::Facebook, pid)) => user.facebook_id = Some(pid.clone()),
                Some((AuthProvider::Local, _)) | None => {}
            }
            if let Some(provider) = link.auth_provider {
                user.auth_provider = provider;
            }
            user.email_verified = true;
            user.last_login = Some(link.last_login);
        })
    }

    async fn set_password_hash(&self, id: &str, hash: &str) -> Result<(), AppError> {
        self.with_user(id, |user| {
            user.password_hash = Some(hash.to_string());
            user.refresh_tokens.clear();
        })
    }
}
