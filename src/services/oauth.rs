// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth 2.0 authorization-code client for Google and Facebook.
//!
//! Handles:
//! - Building the provider authorization URL
//! - Exchanging the callback code for a provider access token
//! - Fetching the user profile and narrowing it to [`OAuthProfile`]

use crate::config::{Config, OAuthClientConfig};
use crate::error::AppError;
use crate::models::{AuthProvider, OAuthProfile, ProfileValue};
use serde::Deserialize;
use std::time::Duration;

/// Upper bound on each provider request (token exchange, userinfo).
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider endpoint set.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub scope: &'static str,
}

impl ProviderEndpoints {
    pub fn for_provider(provider: AuthProvider) -> Option<Self> {
        match provider {
            AuthProvider::Google => Some(Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
                scope: "openid email profile",
            }),
            AuthProvider::Facebook => Some(Self {
                authorize_url: "https://www.facebook.com/v19.0/dialog/oauth".to_string(),
                token_url: "https://graph.facebook.com/v19.0/oauth/access_token".to_string(),
                userinfo_url: "https://graph.facebook.com/me?fields=id,name,email,picture"
                    .to_string(),
                scope: "email,public_profile",
            }),
            AuthProvider::Local => None,
        }
    }
}

/// Client for one OAuth identity provider.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    provider: AuthProvider,
    endpoints: ProviderEndpoints,
    credentials: OAuthClientConfig,
}

impl OAuthClient {
    /// Create a client for `provider` with its public endpoints.
    pub fn new(provider: AuthProvider, credentials: OAuthClientConfig) -> Result<Self, AppError> {
        let endpoints = ProviderEndpoints::for_provider(provider).ok_or_else(|| {
            AppError::Validation(format!("{provider} is not an OAuth provider"))
        })?;
        Self::with_endpoints(provider, credentials, endpoints, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client against explicit endpoints (e.g. a local fake provider).
    pub fn with_endpoints(
        provider: AuthProvider,
        credentials: OAuthClientConfig,
        endpoints: ProviderEndpoints,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed building OAuth HTTP client: {}", e))?;
        Ok(Self {
            http,
            provider,
            endpoints,
            credentials,
        })
    }

    pub fn provider(&self) -> AuthProvider {
        self.provider
    }

    /// URL the browser is sent to for consent.
    pub fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.endpoints.authorize_url,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(&self.credentials.callback_url),
            urlencoding::encode(self.endpoints.scope),
            urlencoding::encode(state)
        )
    }

    /// Exchange the callback code and fetch the user's profile.
    pub async fn fetch_profile(&self, code: &str) -> Result<OAuthProfile, AppError> {
        let token = self.exchange_code(code).await?;
        let profile = match self.provider {
            AuthProvider::Google => {
                let info: GoogleUserInfo = self.get_json(&token.access_token).await?;
                info.into_profile()
            }
            AuthProvider::Facebook => {
                let info: FacebookUserInfo = self.get_json(&token.access_token).await?;
                info.into_profile()
            }
            AuthProvider::Local => {
                return Err(AppError::Validation(
                    "local is not an OAuth provider".to_string(),
                ))
            }
        };

        tracing::debug!(provider = %self.provider, "Fetched OAuth profile");
        Ok(profile)
    }

    /// Exchange an authorization code for a provider access token.
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("redirect_uri", self.credentials.callback_url.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::OAuthProvider(format!("Token exchange request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::OAuthProvider(format!("Profile request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::OAuthProvider(format!(
                "{} returned HTTP {}: {}",
                self.provider, status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::OAuthProvider(format!("Malformed {} response: {}", self.provider, e)))
    }
}

/// The configured OAuth providers.
#[derive(Clone, Default)]
pub struct OAuthClients {
    google: Option<OAuthClient>,
    facebook: Option<OAuthClient>,
}

impl OAuthClients {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let google = config
            .google
            .clone()
            .map(|c| OAuthClient::new(AuthProvider::Google, c))
            .transpose()?;
        let facebook = config
            .facebook
            .clone()
            .map(|c| OAuthClient::new(AuthProvider::Facebook, c))
            .transpose()?;
        Ok(Self { google, facebook })
    }

    /// Replace or add a provider client.
    pub fn insert(&mut self, client: OAuthClient) {
        match client.provider() {
            AuthProvider::Google => self.google = Some(client),
            AuthProvider::Facebook => self.facebook = Some(client),
            AuthProvider::Local => {}
        }
    }

    pub fn get(&self, provider: AuthProvider) -> Option<&OAuthClient> {
        match provider {
            AuthProvider::Google => self.google.as_ref(),
            AuthProvider::Facebook => self.facebook.as_ref(),
            AuthProvider::Local => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google `oauth2/v2/userinfo` response.
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleUserInfo {
    /// Unverified addresses are dropped; email is the account merge key.
    fn into_profile(self) -> OAuthProfile {
        let emails = self
            .email
            .filter(|_| self.verified_email)
            .map(|value| vec![ProfileValue { value }])
            .unwrap_or_default();

        OAuthProfile {
            id: self.id,
            emails,
            display_name: self.name,
            photos: self
                .picture
                .map(|value| vec![ProfileValue { value }])
                .unwrap_or_default(),
        }
    }
}

/// Graph API `/me` response.
#[derive(Debug, Deserialize)]
struct FacebookUserInfo {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: String,
}

impl FacebookUserInfo {
    fn into_profile(self) -> OAuthProfile {
        OAuthProfile {
            id: self.id,
            emails: self
                .email
                .map(|value| vec![ProfileValue { value }])
                .unwrap_or_default(),
            display_name: self.name,
            photos: self
                .picture
                .map(|p| vec![ProfileValue { value: p.data.url }])
                .unwrap_or_default(),
        }
    }
}
