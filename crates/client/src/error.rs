//! Unified error type for hosts driving the engine.
//!
//! Each module has its own error enum; `ClientError` wraps them so a host
//! can use `?` across modules and still get a shopper-facing message.

use thiserror::Error;

use crate::cart::CheckoutError;
use crate::catalog::DetailError;
use crate::config::ConfigError;
use crate::remote::RemoteError;

/// Engine-level error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A remote service call failed.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An order could not be submitted.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// A product detail could not be loaded.
    #[error("Detail error: {0}")]
    Detail(#[from] DetailError),
}

impl ClientError {
    /// Message suitable for showing to the shopper.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "The store is misconfigured.".to_string(),
            Self::Remote(e) => e.user_message(),
            Self::Checkout(e) => e.user_message(),
            Self::Detail(e) => e.user_message(),
        }
    }

    /// Whether the error points at a bug or an outage rather than the shopper.
    #[must_use]
    pub const fn is_unexpected(&self) -> bool {
        match self {
            Self::Config(_) => true,
            Self::Remote(e) | Self::Checkout(CheckoutError::Remote(e)) => e.is_unexpected(),
            Self::Detail(DetailError::Remote(e)) => e.is_unexpected(),
            Self::Checkout(_) | Self::Detail(_) => false,
        }
    }

    /// Log the error at a level matching its cause.
    ///
    /// Unexpected errors go out at ERROR, which the host's tracing layer
    /// forwards to error tracking.
    pub fn report(&self) {
        if self.is_unexpected() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::warn!(error = %self, "Request failed");
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
