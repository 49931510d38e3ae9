//! Signed-in session handle.
//!
//! The session is owned by the host application (credential capture lives
//! elsewhere). The engine only reads the bearer token, listens for token
//! changes, and asks for a forced logout when the services report an expired
//! credential.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio::sync::watch;

use crate::remote::RemoteError;

/// Number of hex characters of the token digest used as an account fingerprint.
const FINGERPRINT_LEN: usize = 16;

/// A bearer token.
///
/// `Debug` never prints the token itself.
#[derive(Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Stable, non-reversible identifier for the account behind this token.
    ///
    /// Used to scope the persisted replicas and to correlate log lines.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.expose().as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        hex
    }
}

impl From<SecretString> for BearerToken {
    fn from(secret: SecretString) -> Self {
        Self(secret)
    }
}

impl PartialEq for BearerToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for BearerToken {}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BearerToken")
            .field(&self.fingerprint())
            .finish()
    }
}

/// Shared session state.
///
/// Cheaply cloneable; all clones observe the same token.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: watch::Sender<Option<BearerToken>>,
    forced_logouts: AtomicU64,
}

impl Session {
    /// Create a session, optionally already signed in.
    #[must_use]
    pub fn new(token: Option<BearerToken>) -> Self {
        let (tx, _rx) = watch::channel(token);
        Self {
            inner: Arc::new(SessionInner {
                token: tx,
                forced_logouts: AtomicU64::new(0),
            }),
        }
    }

    /// A signed-out session.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(None)
    }

    /// Current bearer token, if signed in.
    #[must_use]
    pub fn token(&self) -> Option<BearerToken> {
        self.inner.token.borrow().clone()
    }

    /// Whether a token is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.token.borrow().is_some()
    }

    /// Replace the token. Subscribers are only notified if it actually changed.
    pub fn sign_in(&self, token: BearerToken) {
        self.inner.token.send_if_modified(|current| {
            if current.as_ref() == Some(&token) {
                return false;
            }
            tracing::info!(account = %token.fingerprint(), "Session token updated");
            *current = Some(token);
            true
        });
    }

    /// Drop the token because the services rejected it.
    pub fn force_logout(&self) {
        let changed = self.inner.token.send_if_modified(|current| current.take().is_some());
        if changed {
            self.inner.forced_logouts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Credential expired, forcing logout");
        }
    }

    /// How many times the session has been forcibly logged out.
    #[must_use]
    pub fn forced_logouts(&self) -> u64 {
        self.inner.forced_logouts.load(Ordering::Relaxed)
    }

    /// Receiver that wakes whenever the token changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<BearerToken>> {
        self.inner.token.subscribe()
    }

    /// React to a failed remote call. An expired credential logs the user out.
    pub fn observe_failure(&self, error: &RemoteError) {
        if matches!(error, RemoteError::AuthExpired) {
            self.force_logout();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &*self.inner.token.borrow())
            .field("forced_logouts", &self.forced_logouts())
            .finish()
    }
}
