//! Single-flight guard for membership mutations.
//!
//! Keys are `(product, operation)` pairs. [`OperationGuard::begin`] is an
//! atomic test-and-set: it either claims the key and hands back a
//! [`PendingPermit`], or reports that a mutation for that key is already in
//! flight. A key also conflicts with the opposite operation on the same
//! product, so an add and a remove of one product never race each other.
//! Dropping the permit releases the key, which also covers a cancelled
//! owning future.

use std::collections::HashSet;
use std::sync::Arc;

use bazaar_core::{MembershipKind, OperationKind, ProductId};
use parking_lot::Mutex;
use thiserror::Error;

/// Identifies one kind of mutation on one product.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub product: ProductId,
    pub operation: OperationKind,
}

impl PendingKey {
    #[must_use]
    pub const fn new(product: ProductId, operation: OperationKind) -> Self {
        Self { product, operation }
    }
}

impl std::fmt::Display for PendingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.operation, self.product)
    }
}

/// Errors from claiming a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("{0} is already in flight")]
    AlreadyPending(PendingKey),
}

/// Tracks in-flight mutations.
///
/// Cheaply cloneable; clones share the same pending set.
#[derive(Debug, Clone, Default)]
pub struct OperationGuard {
    pending: Arc<Mutex<HashSet<PendingKey>>>,
}

impl OperationGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::AlreadyPending`] if the key, or its opposite
    /// operation on the same product, is already claimed.
    pub fn begin(&self, key: PendingKey) -> Result<PendingPermit, GuardError> {
        {
            let mut pending = self.pending.lock();
            let opposite = PendingKey::new(key.product.clone(), key.operation.opposite());
            if pending.contains(&opposite) || !pending.insert(key.clone()) {
                return Err(GuardError::AlreadyPending(key));
            }
        }
        tracing::trace!(key = %key, "Mutation pending");
        Ok(PendingPermit {
            guard: self.clone(),
            key,
        })
    }

    /// Release `key`. The entry is removed, not flagged.
    pub fn end(&self, key: &PendingKey) {
        if self.pending.lock().remove(key) {
            tracing::trace!(key = %key, "Mutation settled");
        }
    }

    #[must_use]
    pub fn is_pending(&self, key: &PendingKey) -> bool {
        self.pending.lock().contains(key)
    }

    /// Whether either direction of a membership mutation is in flight for `product`.
    #[must_use]
    pub fn is_membership_pending(&self, product: &ProductId, kind: MembershipKind) -> bool {
        let pending = self.pending.lock();
        pending
            .iter()
            .any(|key| &key.product == product && key.operation.membership() == kind)
    }

    /// Snapshot of the claimed keys.
    #[must_use]
    pub fn pending_keys(&self) -> Vec<PendingKey> {
        self.pending.lock().iter().cloned().collect()
    }
}

/// Claim on a pending key. Releases the key when dropped.
#[derive(Debug)]
#[must_use = "dropping the permit releases the key immediately"]
pub struct PendingPermit {
    guard: OperationGuard,
    key: PendingKey,
}

impl Drop for PendingPermit {
    fn drop(&mut self) {
        self.guard.end(&self.key);
    }
}
