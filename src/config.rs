// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Everything here is read once at startup and then shared read-only
//! through [`crate::AppState`].

use std::env;
use std::time::Duration;

/// Name of the HTTP-only cookie carrying the refresh token.
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Which identity store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Argon2id cost parameters for password hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCost {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for PasswordCost {
    fn default() -> Self {
        Self {
            memory_kib: argon2::Params::DEFAULT_M_COST,
            iterations: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

/// Credentials for one OAuth identity provider.
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Absolute URL of our `/auth/{provider}/callback` route
    pub callback_url: String,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for OAuth redirects and CORS
    pub client_url: String,
    /// Server port
    pub port: u16,
    /// Production mode marks cookies `Secure`
    pub production: bool,
    /// Identity store backend
    pub store_backend: StoreBackend,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Access token validity window
    pub access_token_ttl: Duration,
    /// Refresh token validity window
    pub refresh_token_ttl: Duration,
    /// Password hashing cost factor
    pub password_cost: PasswordCost,

    // --- Secrets ---
    /// HMAC key for access tokens
    pub jwt_access_secret: Vec<u8>,
    /// HMAC key for refresh tokens
    pub jwt_refresh_secret: Vec<u8>,
    /// HMAC key for the OAuth `state` parameter
    pub oauth_state_key: Vec<u8>,
    /// Google OAuth client, if configured
    pub google: Option<OAuthClientConfig>,
    /// Facebook OAuth client, if configured
    pub facebook: Option<OAuthClientConfig>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honoured for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("PORT", "expected a port number".to_string()))?;

        let environment = env::var("APP_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let store_backend = match env::var("USER_STORE")
            .unwrap_or_else(|_| "firestore".to_string())
            .as_str()
        {
            "firestore" => StoreBackend::Firestore,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid(
                    "USER_STORE",
                    format!("unknown backend '{other}'"),
                ))
            }
        };

        let jwt_access_secret = required("JWT_ACCESS_SECRET")?.into_bytes();
        let jwt_refresh_secret = required("JWT_REFRESH_SECRET")?.into_bytes();
        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(|v| v.trim().as_bytes().to_vec())
            .unwrap_or_else(|_| jwt_refresh_secret.clone());

        let defaults = PasswordCost::default();
        let password_cost = PasswordCost {
            memory_kib: parse_u32("PASSWORD_HASH_MEMORY_KIB", defaults.memory_kib)?,
            iterations: parse_u32("PASSWORD_HASH_ITERATIONS", defaults.iterations)?,
            parallelism: parse_u32("PASSWORD_HASH_PARALLELISM", defaults.parallelism)?,
        };

        let config = Self {
            client_url: env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .trim_end_matches('/')
                .to_string(),
            port,
            production: environment == "production",
            store_backend,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            access_token_ttl: parse_ttl("JWT_ACCESS_EXPIRES_IN", "15m")?,
            refresh_token_ttl: parse_ttl("JWT_REFRESH_EXPIRES_IN", "7d")?,
            password_cost,
            jwt_access_secret,
            jwt_refresh_secret,
            oauth_state_key,
            google: oauth_client(
                "GOOGLE",
                format!("http://localhost:{port}/auth/google/callback"),
            ),
            facebook: oauth_client(
                "FACEBOOK",
                format!("http://localhost:{port}/auth/facebook/callback"),
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Deterministic configuration for tests.
    ///
    /// Uses the cheapest Argon2 parameters so password tests stay fast.
    pub fn test_default() -> Self {
        Self {
            client_url: "http://localhost:5173".to_string(),
            port: 5000,
            production: false,
            store_backend: StoreBackend::Memory,
            gcp_project_id: "test-project".to_string(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            password_cost: PasswordCost {
                memory_kib: 64,
                iterations: 1,
                parallelism: 1,
            },
            jwt_access_secret: b"test_access_secret_32_bytes_long!".to_vec(),
            jwt_refresh_secret: b"test_refresh_secret_32_bytes_lng!".to_vec(),
            oauth_state_key: b"test_oauth_state_key".to_vec(),
            google: Some(OAuthClientConfig {
                client_id: "test-google-client".to_string(),
                client_secret: "test-google-secret".to_string(),
                callback_url: "http://localhost:5000/auth/google/callback".to_string(),
            }),
            facebook: None,
        }
    }

    /// Reject configurations that would break token separation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_access_secret.is_empty() || self.jwt_refresh_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "JWT_ACCESS_SECRET",
                "token secrets must not be empty".to_string(),
            ));
        }
        if self.jwt_access_secret == self.jwt_refresh_secret {
            return Err(ConfigError::Invalid(
                "JWT_REFRESH_SECRET",
                "must differ from JWT_ACCESS_SECRET".to_string(),
            ));
        }
        if self.access_token_ttl.is_zero() || self.refresh_token_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "JWT_ACCESS_EXPIRES_IN",
                "token lifetimes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, format!("'{raw}' is not a number"))),
        Err(_) => Ok(default),
    }
}

fn parse_ttl(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_duration(&raw).ok_or_else(|| {
        ConfigError::Invalid(name, format!("'{raw}' is not a duration like 15m or 7d"))
    })
}

/// Both id and secret must be present for a provider to be enabled.
fn oauth_client(prefix: &str, default_callback: String) -> Option<OAuthClientConfig> {
    let client_id = env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    if client_id.trim().is_empty() || client_secret.trim().is_empty() {
        return None;
    }

    Some(OAuthClientConfig {
        client_id: client_id.trim().to_string(),
        client_secret: client_secret.trim().to_string(),
        callback_url: env::var(format!("{prefix}_CALLBACK_URL")).unwrap_or(default_callback),
    })
}

/// Parse `<n>[s|m|h|d]` into a duration. A bare number is seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };

    value.checked_mul(multiplier).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
