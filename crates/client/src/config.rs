//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BAZAAR_CATALOG_URL` - Base URL of the catalog service (products, wishlist, cart mutations)
//! - `BAZAAR_SHOPPING_URL` - Base URL of the shopping service (cart aggregate, orders)
//! - `BAZAAR_USER_URL` - Base URL of the user service (seller lookups)
//!
//! ## Optional
//! - `BAZAAR_DATA_DIR` - Directory for the persisted membership replicas (default: .bazaar)
//! - `BAZAAR_TOKEN` - Bearer token of the signed-in user
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_DATA_DIR: &str = ".bazaar";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront client configuration.
///
/// Implements `Debug` manually to redact the bearer token.
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URLs of the remote services
    pub endpoints: ServiceEndpoints,
    /// Directory holding the persisted membership replicas
    pub data_dir: PathBuf,
    /// Bearer token of the signed-in user, if any
    pub token: Option<SecretString>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoints", &self.endpoints)
            .field("data_dir", &self.data_dir)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("sentry_dsn", &self.sentry_dsn)
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

/// Base URLs of the three remote services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    /// Catalog service: product listing, product detail, wishlist and cart mutations
    pub catalog: Url,
    /// Shopping service: cart aggregate and order submission
    pub shopping: Url,
    /// User service: seller lookups
    pub user: Url,
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a URL is
    /// not an absolute http(s) URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let endpoints = ServiceEndpoints::from_env()?;
        let data_dir = PathBuf::from(get_env_or_default("BAZAAR_DATA_DIR", DEFAULT_DATA_DIR));
        let token = get_optional_env("BAZAAR_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);

        Ok(Self {
            endpoints,
            data_dir,
            token,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }
}

impl ServiceEndpoints {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            catalog: parse_service_url("BAZAAR_CATALOG_URL", &get_required_env("BAZAAR_CATALOG_URL")?)?,
            shopping: parse_service_url(
                "BAZAAR_SHOPPING_URL",
                &get_required_env("BAZAAR_SHOPPING_URL")?,
            )?,
            user: parse_service_url("BAZAAR_USER_URL", &get_required_env("BAZAAR_USER_URL")?)?,
        })
    }

    /// Build endpoints from already-parsed URLs.
    #[must_use]
    pub const fn new(catalog: Url, shopping: Url, user: Url) -> Self {
        Self {
            catalog,
            shopping,
            user,
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a service base URL, accepting only http and https.
fn parse_service_url(key: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{other}' (expected http or https)"),
        )),
    }
}
