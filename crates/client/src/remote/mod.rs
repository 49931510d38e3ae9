//! Remote catalog, shopping and user service client.
//!
//! # Architecture
//!
//! - Plain JSON over HTTP with `reqwest`, bearer token on every call
//! - The services are the source of truth; nothing here touches the local replicas
//! - One round trip per call: no retries, no backoff, no caching
//!
//! # Services
//!
//! ## Catalog
//! - Product listing and product detail
//! - Wishlist and cart membership mutations
//!
//! ## Shopping
//! - The single cart aggregate document
//! - Order submission (with an idempotency key per attempt)
//!
//! ## User
//! - Seller lookups for product detail
//!
//! # Example
//!
//! ```rust,ignore
//! use bazaar_client::remote::RemoteClient;
//!
//! let client = RemoteClient::new(config.endpoints.clone())?;
//!
//! let products = client.fetch_catalog(&token).await?;
//! client.add_to_cart(&products[0].id, Quantity::ONE, &token).await?;
//!
//! let cart = client.fetch_cart(&token).await?;
//! println!("total: {}", cart.total());
//! ```

mod client;
mod types;
mod wire;

pub use client::RemoteClient;
pub use types::*;

use thiserror::Error;

/// Maximum number of response body characters kept in logs and error messages.
pub(crate) const BODY_EXCERPT_LEN: usize = 500;

/// Errors that can occur when calling the remote services.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport failure before a response arrived.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Service error: HTTP {status}: {message}")]
    Service { status: u16, message: String },

    /// The service rejected the bearer token (HTTP 401).
    #[error("Authentication expired")]
    AuthExpired,

    /// A success response body could not be parsed.
    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),

    /// An endpoint URL could not be built.
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

impl RemoteError {
    /// Message suitable for showing to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(_) => {
                "Unable to reach the store. Check your connection and try again.".to_string()
            }
            Self::Service { status, message } => {
                if message.trim().is_empty() {
                    format!("The store could not complete the request (HTTP {status}).")
                } else {
                    message.clone()
                }
            }
            Self::AuthExpired => "Your session has expired. Please sign in again.".to_string(),
            Self::Decode(_) => "The store sent an unexpected response.".to_string(),
            Self::Endpoint(_) => "The store is misconfigured.".to_string(),
        }
    }

    /// Whether the failure points at the service or the client rather than the shopper.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        match self {
            Self::Service { status, .. } => *status >= 500,
            Self::Decode(_) | Self::Endpoint(_) => true,
            Self::Network(_) | Self::AuthExpired => false,
        }
    }
}

/// Truncate a response body for logging.
pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Service {
            status: 404,
            message: "Product not found".to_string(),
        };
        assert_eq!(err.to_string(), "Service error: HTTP 404: Product not found");
        assert_eq!(RemoteError::AuthExpired.to_string(), "Authentication expired");
    }

    #[test]
    fn test_user_message_prefers_service_message() {
        let err = RemoteError::Service {
            status: 409,
            message: "Out of stock".to_string(),
        };
        assert_eq!(err.user_message(), "Out of stock");
    }

    #[test]
    fn test_user_message_blank_service_message() {
        let err = RemoteError::Service {
            status: 502,
            message: "  ".to_string(),
        };
        assert_eq!(
            err.user_message(),
            "The store could not complete the request (HTTP 502)."
        );
    }

    #[test]
    fn test_is_unexpected() {
        assert!(
            RemoteError::Service {
                status: 500,
                message: String::new()
            }
            .is_unexpected()
        );
        assert!(
            !RemoteError::Service {
                status: 400,
                message: String::new()
            }
            .is_unexpected()
        );
        assert!(!RemoteError::AuthExpired.is_unexpected());
    }

    #[test]
    fn test_excerpt_truncates() {
        let body = "x".repeat(BODY_EXCERPT_LEN + 10);
        assert_eq!(excerpt(&body).len(), BODY_EXCERPT_LEN);
        assert_eq!(excerpt("short"), "short");
    }
}
