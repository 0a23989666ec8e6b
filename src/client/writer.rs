//! The staged writer: compose a mutation as a set of blob/tree/commit
//! objects over a known base commit, then publish it atomically with one
//! ref update plus packfile push.
//!
//! The writer keeps a path index: a map from each known path to its
//! current hash and mode in the virtual working tree (the base commit's
//! tree plus pending edits). Stage calls edit the index and mark ancestor
//! directories dirty; `commit` materializes new tree objects for the
//! dirty directories bottom-up and stages a commit object; `push` sends
//! one pack and the guarded ref update. A failed push leaves the staged
//! pack intact, so `push` can simply be called again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Client, path, refs::Ref};
use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::{
            blob::Blob,
            commit::Commit,
            signature::Signature,
            tree::{Tree, TreeItem, TreeItemMode},
        },
        pack::{encode::PackBuilder, entry::Entry},
    },
    protocol::transport::{ProtocolStream, SmartTransport},
    storage::{ObjectStore, store_or_ephemeral, with_object_store},
};

#[derive(Debug, Clone, Copy)]
struct PathEntry {
    hash: ObjectHash,
    mode: TreeItemMode,
}

/// A mutation session over one ref. See the module docs for the state
/// machine.
pub struct StagedWriter<'a, T: SmartTransport> {
    client: &'a Client<T>,
    ref_name: String,
    /// The hash the remote ref is expected to hold (old-hash guard).
    remote_hash: ObjectHash,
    /// Most recent staged (or pushed) commit; the next commit's parent.
    last_commit: ObjectHash,
    path_index: HashMap<String, PathEntry>,
    /// Directories whose tree objects must be rebuilt at the next commit.
    dirty: HashSet<String>,
    builder: PackBuilder,
    store: Arc<dyn ObjectStore>,
    cleaned: bool,
}

impl<T: SmartTransport> Client<T> {
    /// Open a staged writer on an existing ref.
    pub async fn new_staged_writer(&self, base: Ref) -> Result<StagedWriter<'_, T>, GitError> {
        let store = store_or_ephemeral();
        let (root_tree, flat) = with_object_store(store.clone(), async {
            let commit = self.commit_read_through(&store, base.hash).await?;
            let flat = self.get_flat_tree(commit.tree_id).await?;
            Ok::<_, GitError>((commit.tree_id, flat))
        })
        .await?;

        let mut path_index = HashMap::new();
        path_index.insert(
            String::new(),
            PathEntry {
                hash: root_tree,
                mode: TreeItemMode::Tree,
            },
        );
        for entry in &flat.entries {
            path_index.insert(
                entry.path.clone(),
                PathEntry {
                    hash: entry.hash,
                    mode: entry.mode,
                },
            );
        }

        Ok(StagedWriter {
            client: self,
            ref_name: base.name,
            remote_hash: base.hash,
            last_commit: base.hash,
            path_index,
            dirty: HashSet::new(),
            builder: PackBuilder::new(self.pack_storage()),
            store,
            cleaned: false,
        })
    }
}

impl<'a, T: SmartTransport> StagedWriter<'a, T> {
    fn ensure_open(&self) -> Result<(), GitError> {
        if self.cleaned {
            return Err(GitError::WriterCleanedUp);
        }
        Ok(())
    }

    /// The ref this writer publishes to, at its last acknowledged hash.
    pub fn base_ref(&self) -> Ref {
        Ref {
            name: self.ref_name.clone(),
            hash: self.remote_hash,
        }
    }

    /// Hash of the most recent staged or pushed commit.
    pub fn last_commit(&self) -> ObjectHash {
        self.last_commit
    }

    /// Mark every ancestor directory dirty, inserting placeholders for
    /// directories that do not exist yet.
    fn mark_ancestors_dirty(&mut self, child_path: &str) {
        for dir in path::ancestor_dirs(child_path) {
            self.path_index.entry(dir.clone()).or_insert(PathEntry {
                hash: ObjectHash::ZERO,
                mode: TreeItemMode::Tree,
            });
            self.dirty.insert(dir);
        }
    }

    /// Fail when a new blob path would nest under an existing blob.
    fn check_ancestors_are_trees(&self, blob_path: &str) -> Result<(), GitError> {
        for dir in path::ancestor_dirs(blob_path) {
            if let Some(entry) = self.path_index.get(&dir)
                && !entry.mode.is_tree()
            {
                return Err(GitError::InvalidPath(format!(
                    "`{dir}` is a file, not a directory"
                )));
            }
        }
        Ok(())
    }

    /// Stage a new blob. The path must be absent.
    pub fn create_blob(&mut self, raw_path: &str, content: &[u8]) -> Result<ObjectHash, GitError> {
        self.ensure_open()?;
        let blob_path = path::normalize_blob_path(raw_path)?;
        if self.path_index.contains_key(&blob_path) {
            return Err(GitError::InvalidArgument(format!(
                "path `{blob_path}` already exists"
            )));
        }
        self.check_ancestors_are_trees(&blob_path)?;

        let blob = Blob::from_content_bytes(content.to_vec());
        self.builder.add_object(&Entry::from(blob.clone()))?;
        self.path_index.insert(
            blob_path.clone(),
            PathEntry {
                hash: blob.id,
                mode: TreeItemMode::Blob,
            },
        );
        self.mark_ancestors_dirty(&blob_path);
        Ok(blob.id)
    }

    /// Stage new content for an existing blob. The old blob simply stops
    /// being referenced.
    pub fn update_blob(&mut self, raw_path: &str, content: &[u8]) -> Result<ObjectHash, GitError> {
        self.ensure_open()?;
        let blob_path = path::normalize_blob_path(raw_path)?;
        match self.path_index.get(&blob_path) {
            Some(entry) if !entry.mode.is_tree() => {}
            Some(_) => {
                return Err(GitError::UnexpectedObjectType {
                    expected: "blob".to_string(),
                    actual: "tree".to_string(),
                });
            }
            None => return Err(GitError::ObjectNotFound(blob_path)),
        }

        let blob = Blob::from_content_bytes(content.to_vec());
        self.builder.add_object(&Entry::from(blob.clone()))?;
        self.path_index.insert(
            blob_path.clone(),
            PathEntry {
                hash: blob.id,
                mode: TreeItemMode::Blob,
            },
        );
        self.mark_ancestors_dirty(&blob_path);
        Ok(blob.id)
    }

    /// Stage removal of a blob.
    pub fn delete_blob(&mut self, raw_path: &str) -> Result<(), GitError> {
        self.ensure_open()?;
        let blob_path = path::normalize_blob_path(raw_path)?;
        match self.path_index.get(&blob_path) {
            Some(entry) if !entry.mode.is_tree() => {}
            Some(_) => {
                return Err(GitError::UnexpectedObjectType {
                    expected: "blob".to_string(),
                    actual: "tree".to_string(),
                });
            }
            None => return Err(GitError::ObjectNotFound(blob_path)),
        }
        self.path_index.remove(&blob_path);
        self.mark_ancestors_dirty(&blob_path);
        Ok(())
    }

    /// Stage removal of a directory and everything under it. The empty
    /// path clears the whole tree.
    pub fn delete_tree(&mut self, raw_path: &str) -> Result<(), GitError> {
        self.ensure_open()?;
        let tree_path = path::normalize_tree_path(raw_path)?;
        match self.path_index.get(&tree_path) {
            Some(entry) if entry.mode.is_tree() => {}
            Some(_) => {
                return Err(GitError::UnexpectedObjectType {
                    expected: "tree".to_string(),
                    actual: "blob".to_string(),
                });
            }
            None => return Err(GitError::ObjectNotFound(tree_path)),
        }

        let prefix = if tree_path.is_empty() {
            String::new()
        } else {
            format!("{tree_path}/")
        };
        self.path_index.retain(|key, _| {
            key.is_empty() || (!key.starts_with(&prefix) && *key != tree_path)
        });
        if tree_path.is_empty() {
            self.dirty.insert(String::new());
        } else {
            self.mark_ancestors_dirty(&tree_path);
        }
        Ok(())
    }

    /// Whether a blob exists at the path in the virtual working tree.
    pub fn blob_exists(&self, raw_path: &str) -> Result<bool, GitError> {
        self.ensure_open()?;
        let blob_path = path::normalize_blob_path(raw_path)?;
        Ok(self
            .path_index
            .get(&blob_path)
            .is_some_and(|entry| !entry.mode.is_tree()))
    }

    /// Read the tree at a path as it currently stands: a pending snapshot
    /// for dirty directories, a fetch through the store otherwise.
    pub async fn get_tree(&self, raw_path: &str) -> Result<Tree, GitError> {
        self.ensure_open()?;
        let tree_path = path::normalize_tree_path(raw_path)?;
        let entry = self
            .path_index
            .get(&tree_path)
            .copied()
            .ok_or_else(|| GitError::ObjectNotFound(tree_path.clone()))?;
        if !entry.mode.is_tree() {
            return Err(GitError::UnexpectedObjectType {
                expected: "tree".to_string(),
                actual: "blob".to_string(),
            });
        }

        if self.dirty.contains(&tree_path) {
            return self.snapshot_tree(&tree_path);
        }
        with_object_store(self.store.clone(), async {
            self.client.tree_read_through(&self.store, entry.hash).await
        })
        .await
    }

    /// Build the would-be tree object for a directory from the path index,
    /// recursing into dirty subdirectories. Nothing is staged.
    fn snapshot_tree(&self, dir: &str) -> Result<Tree, GitError> {
        let mut items = Vec::new();
        for (child_path, entry) in self.direct_children(dir) {
            let id = if entry.mode.is_tree() && self.dirty.contains(&child_path) {
                self.snapshot_tree(&child_path)?.id
            } else {
                entry.hash
            };
            items.push(TreeItem::new(
                entry.mode,
                id,
                path::base_name(&child_path).to_string(),
            ));
        }
        Tree::from_tree_items(items)
    }

    fn direct_children(&self, dir: &str) -> Vec<(String, PathEntry)> {
        self.path_index
            .iter()
            .filter(|(key, _)| !key.is_empty() && path::parent_dir(key) == Some(dir))
            .map(|(key, entry)| (key.clone(), *entry))
            .collect()
    }

    /// Materialize tree objects for every dirty directory bottom-up, then
    /// stage a commit referencing the previous one. No network I/O.
    pub fn commit(
        &mut self,
        message: &str,
        author: Signature,
        committer: Signature,
    ) -> Result<Commit, GitError> {
        self.ensure_open()?;
        if self.dirty.is_empty() {
            return Err(GitError::InvalidArgument(
                "nothing staged to commit".to_string(),
            ));
        }

        // Deepest directories first so parents see fresh child hashes.
        let mut dirs: Vec<String> = self.dirty.iter().cloned().collect();
        dirs.sort_by_key(|dir| {
            std::cmp::Reverse(if dir.is_empty() {
                0
            } else {
                dir.split('/').count()
            })
        });

        for dir in dirs {
            let children = self.direct_children(&dir);
            if children.is_empty() && !dir.is_empty() {
                // A directory with no entries vanishes from its parent.
                self.path_index.remove(&dir);
                continue;
            }
            let items: Vec<TreeItem> = children
                .iter()
                .map(|(child_path, entry)| {
                    TreeItem::new(entry.mode, entry.hash, path::base_name(child_path).to_string())
                })
                .collect();
            let tree = Tree::from_tree_items(items)?;
            self.builder.add_object(&Entry::from(tree.clone()))?;
            self.store.add(Entry::from(tree.clone()))?;
            self.path_index
                .get_mut(&dir)
                .expect("dirty directory present in index")
                .hash = tree.id;
        }

        let root_hash = self.path_index[""].hash;
        let parents = if self.last_commit.is_zero() {
            vec![]
        } else {
            vec![self.last_commit]
        };
        let commit = Commit::new(author, committer, root_hash, parents, message);
        self.builder.add_object(&Entry::from(commit.clone()))?;
        self.store.add(Entry::from(commit.clone()))?;
        self.last_commit = commit.id;
        self.dirty.clear();
        Ok(commit)
    }

    /// Publish staged commits: one receive-pack POST carrying the pack and
    /// the guarded ref update.
    ///
    /// On success the writer's base advances and the pack builder resets;
    /// further edits continue on top of the pushed commit. On a transport
    /// failure or server rejection the staged pack is left untouched and
    /// `push` may be called again without re-staging.
    pub async fn push(&mut self) -> Result<(), GitError> {
        self.ensure_open()?;
        if self.last_commit == self.remote_hash {
            return Err(GitError::InvalidArgument(
                "no staged commit to push".to_string(),
            ));
        }

        let pack: ProtocolStream = Box::pin(self.builder.emit()?);
        self.client
            .push_ref_update(self.remote_hash, self.last_commit, &self.ref_name, Some(pack))
            .await?;

        // The remote acknowledged: it is the source of truth now. Local
        // staging cleanup failures are logged and swallowed.
        self.remote_hash = self.last_commit;
        if let Err(err) = self.builder.cleanup() {
            tracing::warn!(error = %err, "pack builder cleanup after push");
        }
        self.builder = PackBuilder::new(self.client.pack_storage());
        Ok(())
    }

    /// Terminate the writer and release the staged pack. A second call
    /// returns [`GitError::WriterCleanedUp`].
    pub fn cleanup(&mut self) -> Result<(), GitError> {
        if self.cleaned {
            return Err(GitError::WriterCleanedUp);
        }
        if let Err(err) = self.builder.cleanup() {
            tracing::warn!(error = %err, "pack builder cleanup");
        }
        self.cleaned = true;
        Ok(())
    }
}
