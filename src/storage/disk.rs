//! Disk-spilling object store: each object lives in a file named by its
//! hex hash under a private temp directory, content in the canonical
//! `"<type> <len>\0<payload>"` form.

use std::io::Write;
use std::str::FromStr;

use bstr::ByteSlice;
use tempfile::{NamedTempFile, TempDir};

use super::ObjectStore;
use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{object::types::ObjectType, pack::entry::Entry},
};

/// Object store backed by a private temp directory.
///
/// Writes go through a temp file plus an atomic rename, so concurrent
/// adds of the same object settle on identical content.
pub struct DiskStore {
    dir: TempDir,
}

impl DiskStore {
    pub fn new() -> Result<DiskStore, GitError> {
        Ok(DiskStore {
            dir: tempfile::Builder::new().prefix("nanogit-objects-").tempdir()?,
        })
    }

    fn object_path(&self, hash: &ObjectHash) -> std::path::PathBuf {
        self.dir.path().join(hash.to_string())
    }
}

impl ObjectStore for DiskStore {
    fn get(&self, hash: &ObjectHash) -> Result<Option<Entry>, GitError> {
        let path = self.object_path(hash);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let header_end = raw.find_byte(b'\x00').ok_or_else(|| {
            GitError::InvalidObjectType(format!("stored object {hash} missing header"))
        })?;
        let header = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let type_name = header.split(' ').next().unwrap_or_default();
        let obj_type = ObjectType::from_string(type_name)?;

        Ok(Some(Entry {
            obj_type,
            data: raw[header_end + 1..].to_vec(),
            hash: *hash,
        }))
    }

    fn add(&self, entry: Entry) -> Result<(), GitError> {
        let path = self.object_path(&entry.hash);
        if path.exists() {
            // Content-addressed: an existing file already holds these bytes.
            return Ok(());
        }
        let mut tmp = NamedTempFile::new_in(self.dir.path())?;
        tmp.write_all(entry.obj_type.to_bytes())?;
        tmp.write_all(b" ")?;
        tmp.write_all(entry.data.len().to_string().as_bytes())?;
        tmp.write_all(b"\x00")?;
        tmp.write_all(&entry.data)?;
        tmp.persist(&path)
            .map_err(|e| GitError::IOError(e.error))?;
        Ok(())
    }

    fn has(&self, hash: &ObjectHash) -> Result<bool, GitError> {
        Ok(self.object_path(hash).exists())
    }

    fn keys(&self) -> Result<Vec<ObjectHash>, GitError> {
        let mut keys = Vec::new();
        let entries = match std::fs::read_dir(self.dir.path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };
        for dirent in entries {
            let dirent = dirent?;
            if let Ok(hash) = ObjectHash::from_str(&dirent.file_name().to_string_lossy()) {
                keys.push(hash);
            }
        }
        Ok(keys)
    }

    fn cleanup(&self) -> Result<(), GitError> {
        match std::fs::remove_dir_all(self.dir.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::{blob::Blob, tree::Tree};

    /// Objects round-trip through the canonical on-disk form.
    #[test]
    fn test_round_trip() {
        let store = DiskStore::new().unwrap();
        let blob = Blob::from_content("on disk");
        let entry = Entry::from(blob.clone());

        store.add(entry.clone()).unwrap();
        assert!(store.has(&blob.id).unwrap());
        let loaded = store.get(&blob.id).unwrap().unwrap();
        assert_eq!(loaded.obj_type, ObjectType::Blob);
        assert_eq!(loaded.data, blob.data);
        assert_eq!(store.keys().unwrap(), vec![blob.id]);
    }

    /// Tree entries keep their type tag through the store.
    #[test]
    fn test_tree_type_preserved() {
        let store = DiskStore::new().unwrap();
        let tree = Tree::from_tree_items(vec![]).unwrap();
        store.add(Entry::from(tree.clone())).unwrap();
        assert_eq!(
            store.get(&tree.id).unwrap().unwrap().obj_type,
            ObjectType::Tree
        );
    }

    /// Missing objects read back as None.
    #[test]
    fn test_missing_object() {
        let store = DiskStore::new().unwrap();
        assert!(store.get(&ObjectHash::new(b"absent")).unwrap().is_none());
    }

    /// Cleanup removes the directory and is idempotent.
    #[test]
    fn test_cleanup_idempotent() {
        let store = DiskStore::new().unwrap();
        store.add(Entry::from(Blob::from_content("x"))).unwrap();
        store.cleanup().unwrap();
        store.cleanup().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
