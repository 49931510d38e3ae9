//! Locally persisted membership replicas.
//!
//! Each membership collection (wishlist, cart) is mirrored as a JSON array of
//! product ids. Reads that find nothing usable degrade to an empty set; writes
//! replace the whole collection, so the last writer always wins.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bazaar_core::{MembershipKind, OperationKind, ProductId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::BearerToken;

/// Errors that can occur when persisting a replica.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Filesystem write failed.
    #[error("failed to write replica {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Serialization failed.
    #[error("failed to encode replica: {0}")]
    Encode(#[from] serde_json::Error),
}

// =============================================================================
// MembershipSet
// =============================================================================

/// A set of product ids.
///
/// Serializes as a JSON array; duplicates in persisted input collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipSet(BTreeSet<ProductId>);

impl MembershipSet {
    /// An empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.0.contains(id)
    }

    /// Returns `true` if the id was not already present.
    pub fn insert(&mut self, id: ProductId) -> bool {
        self.0.insert(id)
    }

    /// Returns `true` if the id was present.
    pub fn remove(&mut self, id: &ProductId) -> bool {
        self.0.remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductId> {
        self.0.iter()
    }

    /// Parse the persisted form. Anything but a JSON array of strings is malformed.
    ///
    /// # Errors
    ///
    /// Returns the parse error for malformed input.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl FromIterator<ProductId> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = ProductId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// ReplicaStore
// =============================================================================

/// Persistence backend for one membership collection.
pub trait ReplicaStore: Send + Sync {
    /// Read the persisted collection; absent or malformed data yields an empty set.
    fn load(&self) -> MembershipSet;

    /// Overwrite the persisted collection with `set`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection could not be written.
    fn save(&self, set: &MembershipSet) -> Result<(), ReplicaError>;
}

/// Replica stored as a JSON file.
///
/// Saves write a sibling temp file and rename it over the target, so readers
/// see either the old or the new collection.
#[derive(Debug, Clone)]
pub struct FileReplica {
    path: PathBuf,
}

impl FileReplica {
    /// Replica file `<data_dir>/<kind>.json`.
    #[must_use]
    pub fn new(data_dir: &Path, kind: MembershipKind) -> Self {
        Self {
            path: data_dir.join(format!("{}.json", kind.storage_key())),
        }
    }

    /// Replica file scoped to the account behind `token`:
    /// `<data_dir>/<fingerprint>/<kind>.json`.
    #[must_use]
    pub fn for_account(data_dir: &Path, token: &BearerToken, kind: MembershipKind) -> Self {
        Self::new(&data_dir.join(token.fingerprint()), kind)
    }

    /// Location of the replica file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> ReplicaError {
        ReplicaError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ReplicaStore for FileReplica {
    fn load(&self) -> MembershipSet {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No replica yet");
                return MembershipSet::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable replica, starting empty");
                return MembershipSet::new();
            }
        };

        MembershipSet::parse(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Malformed replica, starting empty");
            MembershipSet::new()
        })
    }

    fn save(&self, set: &MembershipSet) -> Result<(), ReplicaError> {
        let encoded = serde_json::to_vec(set)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, encoded).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Replica held in memory, in its serialized form.
#[derive(Debug, Default)]
pub struct MemoryReplica {
    raw: Mutex<Option<String>>,
}

impl MemoryReplica {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an arbitrary persisted string (possibly malformed).
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    /// The persisted string, if anything was ever stored.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        self.raw.lock().clone()
    }
}

impl ReplicaStore for MemoryReplica {
    fn load(&self) -> MembershipSet {
        let Some(raw) = self.raw.lock().clone() else {
            return MembershipSet::new();
        };
        MembershipSet::parse(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Malformed in-memory replica, starting empty");
            MembershipSet::new()
        })
    }

    fn save(&self, set: &MembershipSet) -> Result<(), ReplicaError> {
        *self.raw.lock() = Some(serde_json::to_string(set)?);
        Ok(())
    }
}

// =============================================================================
// MembershipStore
// =============================================================================

/// Whether a scoped write reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persisted {
    /// The set and its replica were updated.
    Stored,
    /// The store is bound to a different account; nothing changed.
    OtherAccount,
}

/// In-memory membership set paired with its persisted replica.
///
/// Shared between views via `Arc`. Every mutation updates the set and writes
/// the full snapshot to the replica while holding the lock, so the replica
/// always matches some state the set actually had. Writes name the account
/// they were confirmed for and are refused once the store has been rebound
/// to another one.
///
/// Replica I/O is synchronous and happens under the lock. Async callers run
/// writes through `spawn_blocking` (see [`Memberships::record`]).
pub struct MembershipStore {
    kind: MembershipKind,
    state: Mutex<StoreState>,
}

struct StoreState {
    /// Fingerprint of the bound account. Unbound stores accept any writer.
    account: Option<String>,
    replica: Box<dyn ReplicaStore>,
    set: MembershipSet,
}

impl StoreState {
    fn owned_by(&self, account: &str) -> bool {
        self.account.as_deref().is_none_or(|bound| bound == account)
    }
}

impl MembershipStore {
    /// Create an empty, unbound store; call
    /// [`load_from_replica`](Self::load_from_replica) to populate it.
    #[must_use]
    pub fn new(kind: MembershipKind, replica: impl ReplicaStore + 'static) -> Self {
        Self {
            kind,
            state: Mutex::new(StoreState {
                account: None,
                replica: Box::new(replica),
                set: MembershipSet::new(),
            }),
        }
    }

    /// Which collection this store mirrors.
    #[must_use]
    pub const fn kind(&self) -> MembershipKind {
        self.kind
    }

    /// Fingerprint of the account the store is bound to.
    #[must_use]
    pub fn account(&self) -> Option<String> {
        self.state.lock().account.clone()
    }

    /// Replace the in-memory set with the persisted replica. Returns the member count.
    pub fn load_from_replica(&self) -> usize {
        let mut state = self.state.lock();
        state.set = state.replica.load();
        let count = state.set.len();
        debug!(kind = %self.kind, count, "Loaded membership replica");
        count
    }

    /// Bind to `account` and switch to its replica.
    pub fn rebind(&self, account: &str, replica: impl ReplicaStore + 'static) -> usize {
        let mut state = self.state.lock();
        state.account = Some(account.to_string());
        state.replica = Box::new(replica);
        state.set = state.replica.load();
        let count = state.set.len();
        debug!(kind = %self.kind, count, "Rebound membership replica");
        count
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.state.lock().set.contains(id)
    }

    /// Copy of the current set.
    #[must_use]
    pub fn snapshot(&self) -> MembershipSet {
        self.state.lock().set.clone()
    }

    /// Add `id` for `account` and persist the whole set.
    ///
    /// The in-memory set keeps the id even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the replica could not be written.
    pub fn insert_and_persist(&self, account: &str, id: ProductId) -> Result<Persisted, ReplicaError> {
        let mut state = self.state.lock();
        if !state.owned_by(account) {
            return Ok(Persisted::OtherAccount);
        }
        state.set.insert(id);
        state.replica.save(&state.set)?;
        Ok(Persisted::Stored)
    }

    /// Remove `id` for `account` and persist the whole set.
    ///
    /// The in-memory set loses the id even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the replica could not be written.
    pub fn remove_and_persist(&self, account: &str, id: &ProductId) -> Result<Persisted, ReplicaError> {
        let mut state = self.state.lock();
        if !state.owned_by(account) {
            return Ok(Persisted::OtherAccount);
        }
        state.set.remove(id);
        state.replica.save(&state.set)?;
        Ok(Persisted::Stored)
    }
}

impl std::fmt::Debug for MembershipStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MembershipStore")
            .field("kind", &self.kind)
            .field("account", &state.account)
            .field("set", &state.set)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Memberships
// =============================================================================

/// Where the membership replicas live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicaLocation {
    /// In-process only; nothing survives a restart.
    Memory,
    /// One subdirectory per account under this directory.
    Directory(PathBuf),
}

/// The wishlist and cart stores, shared by every view of one session.
#[derive(Debug, Clone)]
pub struct Memberships {
    wishlist: Arc<MembershipStore>,
    cart: Arc<MembershipStore>,
    location: ReplicaLocation,
}

impl Memberships {
    /// Stores that persist under `location` once an account is bound.
    #[must_use]
    pub fn new(location: ReplicaLocation) -> Self {
        Self {
            wishlist: Arc::new(MembershipStore::new(
                MembershipKind::Wishlist,
                MemoryReplica::new(),
            )),
            cart: Arc::new(MembershipStore::new(MembershipKind::Cart, MemoryReplica::new())),
            location,
        }
    }

    /// Stores backed by in-memory replicas.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(ReplicaLocation::Memory)
    }

    /// Stores backed by per-account files under `data_dir`.
    #[must_use]
    pub fn in_directory(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(ReplicaLocation::Directory(data_dir.into()))
    }

    /// Point both stores at the replicas of the account behind `token` and
    /// load them.
    pub fn bind_account(&self, token: &BearerToken) {
        let account = token.fingerprint();
        match &self.location {
            ReplicaLocation::Memory => {
                for store in [&self.wishlist, &self.cart] {
                    if store.account().as_deref() == Some(account.as_str()) {
                        store.load_from_replica();
                    } else {
                        store.rebind(&account, MemoryReplica::new());
                    }
                }
            }
            ReplicaLocation::Directory(dir) => {
                for store in [&self.wishlist, &self.cart] {
                    store.rebind(&account, FileReplica::for_account(dir, token, store.kind()));
                }
            }
        }
        debug!(account = %account, "Bound membership replicas");
    }

    /// Record a mutation the remote confirmed for the account behind `token`.
    ///
    /// If the stores were rebound to another account while the mutation was
    /// in flight, the bound set is left alone and the change goes straight to
    /// the confirming account's own replica file. In-memory replicas have no
    /// such file, so the change is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a replica could not be written.
    pub fn record(
        &self,
        token: &BearerToken,
        operation: OperationKind,
        id: &ProductId,
    ) -> Result<Persisted, ReplicaError> {
        let store = self.store(operation.membership());
        if store.account().is_none() {
            self.bind_account(token);
        }

        let account = token.fingerprint();
        let persisted = if operation.is_add() {
            store.insert_and_persist(&account, id.clone())?
        } else {
            store.remove_and_persist(&account, id)?
        };
        if persisted == Persisted::Stored {
            return Ok(persisted);
        }

        debug!(account = %account, "Account switched during mutation; bound set left alone");
        if let ReplicaLocation::Directory(dir) = &self.location {
            let replica = FileReplica::for_account(dir, token, store.kind());
            let mut set = replica.load();
            if operation.is_add() {
                set.insert(id.clone());
            } else {
                set.remove(id);
            }
            replica.save(&set)?;
        }
        Ok(persisted)
    }

    #[must_use]
    pub const fn store(&self, kind: MembershipKind) -> &Arc<MembershipStore> {
        match kind {
            MembershipKind::Wishlist => &self.wishlist,
            MembershipKind::Cart => &self.cart,
        }
    }

    #[must_use]
    pub const fn wishlist(&self) -> &Arc<MembershipStore> {
        &self.wishlist
    }

    #[must_use]
    pub const fn cart(&self) -> &Arc<MembershipStore> {
        &self.cart
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "alice";

    fn id(s: &str) -> ProductId {
        ProductId::new(s)
    }

    #[test]
    fn test_file_replica_absent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::new(dir.path(), MembershipKind::Wishlist);
        assert!(replica.load().is_empty());
    }

    #[test]
    fn test_file_replica_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::new(&dir.path().join("nested"), MembershipKind::Cart);

        let set: MembershipSet = [id("b"), id("a")].into_iter().collect();
        replica.save(&set).unwrap();

        assert_eq!(replica.load(), set);
        assert_eq!(
            std::fs::read_to_string(replica.path()).unwrap(),
            r#"["a","b"]"#
        );
    }

    #[test]
    fn test_file_replica_malformed_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::new(dir.path(), MembershipKind::Wishlist);

        std::fs::write(replica.path(), "{not json").unwrap();
        assert!(replica.load().is_empty());

        std::fs::write(replica.path(), r#"{"a": 1}"#).unwrap();
        assert!(replica.load().is_empty());

        std::fs::write(replica.path(), "[1, 2]").unwrap();
        assert!(replica.load().is_empty());
    }

    #[test]
    fn test_file_replica_duplicates_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::new(dir.path(), MembershipKind::Wishlist);
        std::fs::write(replica.path(), r#"["a","a","b"]"#).unwrap();
        assert_eq!(replica.load().len(), 2);
    }

    #[test]
    fn test_file_replica_scoped_per_account() {
        let dir = tempfile::tempdir().unwrap();
        let alice = FileReplica::for_account(dir.path(), &BearerToken::new("alice"), MembershipKind::Cart);
        let bob = FileReplica::for_account(dir.path(), &BearerToken::new("bob"), MembershipKind::Cart);

        alice.save(&[id("p1")].into_iter().collect()).unwrap();

        assert!(alice.load().contains(&id("p1")));
        assert!(bob.load().is_empty());
        assert_ne!(alice.path(), bob.path());
    }

    #[test]
    fn test_memory_replica_malformed_is_empty() {
        assert!(MemoryReplica::with_raw("null").load().is_empty());
        assert!(MemoryReplica::with_raw("").load().is_empty());
    }

    #[test]
    fn test_store_insert_and_remove_persist() {
        let dir = tempfile::tempdir().unwrap();
        let replica = FileReplica::new(dir.path(), MembershipKind::Wishlist);
        let store = MembershipStore::new(MembershipKind::Wishlist, replica.clone());

        assert_eq!(store.insert_and_persist(ACCOUNT, id("p1")).unwrap(), Persisted::Stored);
        assert!(store.contains(&id("p1")));
        assert!(replica.load().contains(&id("p1")));

        store.remove_and_persist(ACCOUNT, &id("p1")).unwrap();
        assert!(!store.contains(&id("p1")));
        assert!(!replica.load().contains(&id("p1")));
    }

    #[test]
    fn test_store_loads_existing_replica() {
        let store = MembershipStore::new(
            MembershipKind::Cart,
            MemoryReplica::with_raw(r#"["x","y"]"#),
        );
        assert!(store.snapshot().is_empty());

        assert_eq!(store.load_from_replica(), 2);
        assert!(store.contains(&id("x")));
    }

    #[test]
    fn test_store_save_failure_keeps_memory_change() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data directory should be makes create_dir_all fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = MembershipStore::new(
            MembershipKind::Wishlist,
            FileReplica::new(&blocker.join("data"), MembershipKind::Wishlist),
        );

        let err = store.insert_and_persist(ACCOUNT, id("p1")).unwrap_err();
        assert!(matches!(err, ReplicaError::Io { .. }));
        assert!(store.contains(&id("p1")));
    }

    #[test]
    fn test_store_concurrent_writers_last_snapshot_wins() {
        let store = Arc::new(MembershipStore::new(
            MembershipKind::Cart,
            MemoryReplica::new(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store.insert_and_persist(ACCOUNT, id(&format!("p{i}"))).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.snapshot().len(), 8);
    }

    #[test]
    fn test_store_rebind_switches_account() {
        let dir = tempfile::tempdir().unwrap();
        let alice = BearerToken::new("alice");
        FileReplica::for_account(dir.path(), &alice, MembershipKind::Wishlist)
            .save(&[id("p1")].into_iter().collect())
            .unwrap();

        let memberships = Memberships::in_directory(dir.path());
        memberships.bind_account(&alice);
        assert!(memberships.wishlist().contains(&id("p1")));

        memberships.bind_account(&BearerToken::new("bob"));
        assert!(memberships.wishlist().snapshot().is_empty());
    }

    #[test]
    fn test_memberships_record_by_kind() {
        let memberships = Memberships::in_memory();
        let token = BearerToken::new("alice");

        let persisted = memberships
            .record(&token, OperationKind::CartAdd, &id("p1"))
            .unwrap();

        assert_eq!(persisted, Persisted::Stored);
        assert!(memberships.cart().contains(&id("p1")));
        assert!(!memberships.wishlist().contains(&id("p1")));
        assert_eq!(memberships.cart().account(), Some(token.fingerprint()));
    }

    #[test]
    fn test_store_refuses_writes_for_other_account() {
        let store = MembershipStore::new(MembershipKind::Wishlist, MemoryReplica::new());
        store.rebind("bob", MemoryReplica::new());

        let persisted = store.insert_and_persist("alice", id("p1")).unwrap();

        assert_eq!(persisted, Persisted::OtherAccount);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_record_after_account_switch_writes_confirming_account() {
        let dir = tempfile::tempdir().unwrap();
        let alice = BearerToken::new("alice");
        let bob = BearerToken::new("bob");
        let memberships = Memberships::in_directory(dir.path());
        memberships.bind_account(&alice);
        memberships.bind_account(&bob);

        let persisted = memberships
            .record(&alice, OperationKind::WishlistAdd, &id("p1"))
            .unwrap();

        assert_eq!(persisted, Persisted::OtherAccount);
        assert!(!memberships.wishlist().contains(&id("p1")));
        let bob_replica = FileReplica::for_account(dir.path(), &bob, MembershipKind::Wishlist);
        assert!(bob_replica.load().is_empty());
        let alice_replica = FileReplica::for_account(dir.path(), &alice, MembershipKind::Wishlist);
        assert!(alice_replica.load().contains(&id("p1")));
    }

    #[test]
    fn test_in_memory_switch_hides_previous_account() {
        let memberships = Memberships::in_memory();
        let alice = BearerToken::new("alice");
        memberships.bind_account(&alice);
        memberships
            .record(&alice, OperationKind::WishlistAdd, &id("p1"))
            .unwrap();

        memberships.bind_account(&alice);
        assert!(memberships.wishlist().contains(&id("p1")));

        memberships.bind_account(&BearerToken::new("bob"));
        assert!(memberships.wishlist().snapshot().is_empty());
    }
}
