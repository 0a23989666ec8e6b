//! Heap-backed object store: a concurrent hash map, unbounded but
//! process-lived.

use dashmap::DashMap;

use super::ObjectStore;
use crate::{errors::GitError, hash::ObjectHash, internal::pack::entry::Entry};

/// Concurrent in-memory object store.
#[derive(Default)]
pub struct MemoryStore {
    objects: DashMap<ObjectHash, Entry>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            objects: DashMap::new(),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryStore {
    fn get(&self, hash: &ObjectHash) -> Result<Option<Entry>, GitError> {
        Ok(self.objects.get(hash).map(|e| e.clone()))
    }

    fn add(&self, entry: Entry) -> Result<(), GitError> {
        self.objects.insert(entry.hash, entry);
        Ok(())
    }

    fn has(&self, hash: &ObjectHash) -> Result<bool, GitError> {
        Ok(self.objects.contains_key(hash))
    }

    fn keys(&self) -> Result<Vec<ObjectHash>, GitError> {
        Ok(self.objects.iter().map(|e| *e.key()).collect())
    }

    fn cleanup(&self) -> Result<(), GitError> {
        self.objects.clear();
        Ok(())
    }
}
