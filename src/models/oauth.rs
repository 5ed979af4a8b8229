// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Narrow, typed view of an OAuth provider's profile.

use serde::{Deserialize, Serialize};

/// A single `{value}` entry as OAuth profiles report emails and photos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileValue {
    pub value: String,
}

/// Profile asserted by an external identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthProfile {
    /// Provider-side user id
    pub id: String,
    #[serde(default)]
    pub emails: Vec<ProfileValue>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photos: Vec<ProfileValue>,
}

impl OAuthProfile {
    /// First non-empty email claim, if any.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .iter()
            .map(|e| e.value.trim())
            .find(|v| !v.is_empty())
    }

    pub fn primary_photo(&self) -> Option<&str> {
        self.photos
            .iter()
            .map(|p| p.value.trim())
            .find(|v| !v.is_empty())
    }

    /// Display name, if the provider sent a usable one.
    pub fn name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}
