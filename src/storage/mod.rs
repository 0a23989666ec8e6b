//! Object storage used as a cache across the multiple round-trips a single
//! logical operation performs (fetch commit, fetch tree, fetch blobs).
//!
//! Stores are keyed by object hash and hold entries in their canonical
//! serialized form. Two backends are provided: a process-lived concurrent
//! map and a disk-spilling directory of hex-named files. Selection is
//! ambient: an operation picks up the store installed in its task scope,
//! or instantiates an ephemeral memory store for the call.

pub mod context;
pub mod disk;
pub mod memory;

pub use context::{active_object_store, store_or_ephemeral, with_object_store};
pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::{errors::GitError, hash::ObjectHash, internal::pack::entry::Entry};

/// Minimal hash-keyed object cache contract.
///
/// Implementations must be safe for concurrent `add`/`get`; because
/// objects are content-addressed, last-writer-wins over identical content
/// is correct.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object by hash.
    fn get(&self, hash: &ObjectHash) -> Result<Option<Entry>, GitError>;

    /// Insert an object. Duplicate inserts are harmless.
    fn add(&self, entry: Entry) -> Result<(), GitError>;

    /// Whether an object with this hash is present.
    fn has(&self, hash: &ObjectHash) -> Result<bool, GitError> {
        Ok(self.get(hash)?.is_some())
    }

    /// All stored hashes, in no particular order.
    fn keys(&self) -> Result<Vec<ObjectHash>, GitError>;

    /// Release backing resources. Idempotent.
    fn cleanup(&self) -> Result<(), GitError>;
}
