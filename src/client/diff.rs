//! Flat tree enumeration and commit-to-commit diffing.
//!
//! A flat tree is the denormalized, path-keyed enumeration of every entry
//! reachable from a root tree, directories listed before their contents.
//! Diffs are computed locally over two flat trees; the object store keeps
//! the tree fetches of one comparison shared.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Client;
use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{tree::TreeItemMode, types::ObjectType},
    protocol::transport::SmartTransport,
    storage::{store_or_ephemeral, with_object_store},
};

/// One entry of a flat tree: slash-joined path from the root plus the
/// entry's own name, mode, kind, and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatTreeEntry {
    pub path: String,
    pub name: String,
    pub mode: TreeItemMode,
    pub entry_type: ObjectType,
    pub hash: ObjectHash,
}

/// Denormalized recursive listing of a root tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatTree {
    pub root: ObjectHash,
    pub entries: Vec<FlatTreeEntry>,
}

/// Classification of one path in a commit diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Modified,
    Deleted,
}

/// One path-level difference between two commits. The zero hash stands in
/// for "no previous value" (Added) and "no current value" (Deleted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiffEntry {
    pub path: String,
    pub status: DiffStatus,
    pub entry_type: ObjectType,
    pub old_hash: ObjectHash,
    pub new_hash: ObjectHash,
}

#[derive(Clone)]
struct FlatKey {
    mode: TreeItemMode,
    entry_type: ObjectType,
    hash: ObjectHash,
}

impl<T: SmartTransport> Client<T> {
    /// Enumerate every entry reachable from `root_tree`.
    ///
    /// Issues a single blob-less fetch for the root when it is not cached,
    /// then walks locally through the object store.
    pub async fn get_flat_tree(&self, root_tree: ObjectHash) -> Result<FlatTree, GitError> {
        let store = store_or_ephemeral();
        with_object_store(store.clone(), async {
            let root = self.tree_read_through(&store, root_tree).await?;

            let mut entries = Vec::new();
            // Explicit stack keeps the walk preorder: a directory entry is
            // followed immediately by its contents.
            struct Frame {
                prefix: String,
                items: Vec<crate::internal::object::tree::TreeItem>,
                next: usize,
            }
            let mut stack = vec![Frame {
                prefix: String::new(),
                items: root.tree_items,
                next: 0,
            }];

            while !stack.is_empty() {
                let (prefix, item) = {
                    let frame = stack.last_mut().expect("stack non-empty");
                    if frame.next >= frame.items.len() {
                        stack.pop();
                        continue;
                    }
                    let item = frame.items[frame.next].clone();
                    frame.next += 1;
                    (frame.prefix.clone(), item)
                };

                let path = if prefix.is_empty() {
                    item.name.clone()
                } else {
                    format!("{prefix}/{}", item.name)
                };
                let entry_type = if item.mode.is_tree() {
                    ObjectType::Tree
                } else if item.mode == TreeItemMode::Commit {
                    ObjectType::Commit
                } else {
                    ObjectType::Blob
                };
                entries.push(FlatTreeEntry {
                    path: path.clone(),
                    name: item.name.clone(),
                    mode: item.mode,
                    entry_type,
                    hash: item.id,
                });

                if item.mode.is_tree() {
                    let subtree = self.tree_read_through(&store, item.id).await?;
                    stack.push(Frame {
                        prefix: path,
                        items: subtree.tree_items,
                        next: 0,
                    });
                }
            }

            Ok(FlatTree {
                root: root_tree,
                entries,
            })
        })
        .await
    }

    /// Diff two commits by path, sorted by path ascending.
    ///
    /// Leaf semantics: entries present only in `head` are Added, present
    /// only in `base` are Deleted, present in both with differing
    /// (hash, mode) are Modified unless the head entry is a tree, in which
    /// case the intermediate difference is not emitted (its leaves carry
    /// the change).
    pub async fn compare_commits(
        &self,
        base: ObjectHash,
        head: ObjectHash,
    ) -> Result<Vec<CommitDiffEntry>, GitError> {
        let store = store_or_ephemeral();
        with_object_store(store.clone(), async {
            let base_commit = self.commit_read_through(&store, base).await?;
            let head_commit = self.commit_read_through(&store, head).await?;

            let base_flat = self.get_flat_tree(base_commit.tree_id).await?;
            let head_flat = self.get_flat_tree(head_commit.tree_id).await?;

            let base_map: BTreeMap<String, FlatKey> = flatten(&base_flat);
            let head_map: BTreeMap<String, FlatKey> = flatten(&head_flat);

            let mut diff = Vec::new();
            let mut paths: Vec<&String> = base_map.keys().chain(head_map.keys()).collect();
            paths.sort();
            paths.dedup();

            for path in paths {
                match (base_map.get(path), head_map.get(path)) {
                    (None, Some(new)) => diff.push(CommitDiffEntry {
                        path: path.clone(),
                        status: DiffStatus::Added,
                        entry_type: new.entry_type,
                        old_hash: ObjectHash::ZERO,
                        new_hash: new.hash,
                    }),
                    (Some(old), None) => diff.push(CommitDiffEntry {
                        path: path.clone(),
                        status: DiffStatus::Deleted,
                        entry_type: old.entry_type,
                        old_hash: old.hash,
                        new_hash: ObjectHash::ZERO,
                    }),
                    (Some(old), Some(new)) => {
                        if (old.hash, old.mode) == (new.hash, new.mode) {
                            continue;
                        }
                        if new.entry_type == ObjectType::Tree {
                            // Head entry is a tree: never Modified. Its
                            // leaves carry the change.
                            continue;
                        }
                        diff.push(CommitDiffEntry {
                            path: path.clone(),
                            status: DiffStatus::Modified,
                            entry_type: new.entry_type,
                            old_hash: old.hash,
                            new_hash: new.hash,
                        });
                    }
                    (None, None) => unreachable!("path came from one of the maps"),
                }
            }
            Ok(diff)
        })
        .await
    }
}

fn flatten(flat: &FlatTree) -> BTreeMap<String, FlatKey> {
    flat.entries
        .iter()
        .map(|e| {
            (
                e.path.clone(),
                FlatKey {
                    mode: e.mode,
                    entry_type: e.entry_type,
                    hash: e.hash,
                },
            )
        })
        .collect()
}
