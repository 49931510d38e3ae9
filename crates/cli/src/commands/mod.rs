//! Subcommand implementations.
//!
//! Every command builds the same [`Context`]: one remote client, one session
//! and the account's membership replicas, shared by a catalog and a cart
//! controller.

pub mod cart;
pub mod catalog;
pub mod membership;

use bazaar_client::{
    BearerToken, CartController, CatalogController, ClientConfig, ClientError, Memberships,
    MutationOutcome, OperationGuard, RemoteClient, Session,
};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The service refused a membership change.
    #[error("{0}")]
    Rejected(String),

    /// A fetch failed; the message is already shopper-facing.
    #[error("{0}")]
    Unavailable(String),

    #[error("Another change to this product is still in progress")]
    AlreadyPending,

    #[error("Not signed in: set BAZAAR_TOKEN")]
    SignedOut,
}

impl CommandError {
    /// Message to show the shopper on exit.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Client(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    /// Log the failure. Client errors choose their own level.
    pub fn report(&self) {
        match self {
            Self::Client(e) => e.report(),
            other => tracing::warn!(error = %other, "Command refused"),
        }
    }
}

/// Turn a mutation outcome into a command result.
pub fn check_outcome(outcome: MutationOutcome) -> Result<(), CommandError> {
    match outcome {
        MutationOutcome::Applied => Ok(()),
        MutationOutcome::Rejected(message) => Err(CommandError::Rejected(message)),
        MutationOutcome::AlreadyPending => Err(CommandError::AlreadyPending),
        MutationOutcome::SignedOut => Err(CommandError::SignedOut),
    }
}

/// Controllers wired for one invocation.
pub struct Context {
    pub session: Session,
    pub catalog: CatalogController,
    pub cart: CartController,
}

impl Context {
    /// Wire the engine from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        let remote = RemoteClient::new(config.endpoints.clone())?;
        let session = Session::new(config.token.clone().map(BearerToken::from));
        let memberships = Memberships::in_directory(&config.data_dir);

        Ok(Self {
            catalog: CatalogController::new(
                remote.clone(),
                session.clone(),
                memberships,
                OperationGuard::new(),
            ),
            cart: CartController::new(remote, session.clone()),
            session,
        })
    }

    /// Fail early when no token is configured.
    pub fn require_session(&self) -> Result<(), CommandError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(CommandError::SignedOut)
        }
    }
}
