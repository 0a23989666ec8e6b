//! The Tree object represents a directory: an ordered sequence of
//! `{mode, name, hash}` entries serialized as the concatenation of
//! `"<octal-mode> <name>\0<20 raw bytes>"`.
//!
//! Entry order is significant for the object id. Git's canonical rule
//! compares entry names byte-wise with directory names treated as if they
//! had a trailing `/` appended, so `"foo.x"` sorts before a directory
//! `"foo"` but after a blob `"foo"`.

use std::cmp::Ordering;
use std::fmt::Display;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::{
    errors::GitError,
    hash::{HASH_SIZE, ObjectHash},
    internal::object::{ObjectTrait, types::ObjectType},
};

/// File mode of a tree entry. All files written by this library use
/// `Blob` (100644); the remaining modes are recognized on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeItemMode {
    Blob,
    BlobExecutable,
    Link,
    Tree,
    Commit,
}

impl Display for TreeItemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(core::str::from_utf8(self.to_bytes()).unwrap())
    }
}

impl TreeItemMode {
    /// Canonical serialized form. Git writes directory modes without a
    /// leading zero (`40000`), though `040000` is accepted on parse.
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            TreeItemMode::Blob => b"100644",
            TreeItemMode::BlobExecutable => b"100755",
            TreeItemMode::Link => b"120000",
            TreeItemMode::Tree => b"40000",
            TreeItemMode::Commit => b"160000",
        }
    }

    /// Parse an octal mode field. Rejects anything outside the recognized
    /// set.
    pub fn from_bytes(mode: &[u8]) -> Result<TreeItemMode, GitError> {
        Ok(match mode {
            b"100644" | b"100664" => TreeItemMode::Blob,
            b"100755" => TreeItemMode::BlobExecutable,
            b"120000" => TreeItemMode::Link,
            b"40000" | b"040000" => TreeItemMode::Tree,
            b"160000" => TreeItemMode::Commit,
            _ => {
                return Err(GitError::InvalidTreeItem(
                    String::from_utf8_lossy(mode).to_string(),
                ));
            }
        })
    }

    /// Whether the entry points at a subtree.
    pub fn is_tree(self) -> bool {
        self == TreeItemMode::Tree
    }
}

/// A single `{mode, name, hash}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub mode: TreeItemMode,
    pub id: ObjectHash,
    pub name: String,
}

impl TreeItem {
    pub fn new(mode: TreeItemMode, id: ObjectHash, name: String) -> TreeItem {
        TreeItem { mode, id, name }
    }

    /// Serialize to `"<mode> <name>\0<20 raw>"`.
    pub fn to_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.name.len() + HASH_SIZE + 8);
        data.extend(self.mode.to_bytes());
        data.extend(b" ");
        data.extend(self.name.as_bytes());
        data.push(b'\x00');
        data.extend(self.id.as_ref());
        data
    }
}

/// Git's `base_name_compare`: byte-wise name comparison where a directory
/// name is followed by a virtual `/`.
fn canonical_entry_cmp(a: &TreeItem, b: &TreeItem) -> Ordering {
    let an = a.name.as_bytes();
    let bn = b.name.as_bytes();
    let common = an.len().min(bn.len());
    match an[..common].cmp(&bn[..common]) {
        Ordering::Equal => {}
        other => return other,
    }
    let ca = an
        .get(common)
        .copied()
        .unwrap_or(if a.mode.is_tree() { b'/' } else { 0 });
    let cb = bn
        .get(common)
        .copied()
        .unwrap_or(if b.mode.is_tree() { b'/' } else { 0 });
    ca.cmp(&cb)
}

/// A directory object: sorted entries plus the content-addressed id.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub id: ObjectHash,
    pub tree_items: Vec<TreeItem>,
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "tree {}", self.id)?;
        for item in &self.tree_items {
            writeln!(f, "{} {} {}", item.mode, item.id, item.name)?;
        }
        Ok(())
    }
}

fn validate_entry_name(name: &str) -> Result<(), GitError> {
    if name.is_empty() {
        return Err(GitError::InvalidTreeItem("empty entry name".to_string()));
    }
    if name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(GitError::InvalidTreeItem(name.to_string()));
    }
    Ok(())
}

impl Tree {
    /// Build a tree from entries in any order. Entries are validated and
    /// sorted per the canonical rule before the id is computed.
    pub fn from_tree_items(mut tree_items: Vec<TreeItem>) -> Result<Tree, GitError> {
        for item in &tree_items {
            validate_entry_name(&item.name)?;
        }
        tree_items.sort_by(canonical_entry_cmp);
        let mut tree = Tree {
            id: ObjectHash::ZERO,
            tree_items,
        };
        tree.id = ObjectHash::from_type_and_data(ObjectType::Tree, &tree.to_data()?);
        Ok(tree)
    }

    /// Look up a direct child entry by name.
    pub fn entry(&self, name: &str) -> Option<&TreeItem> {
        self.tree_items.iter().find(|item| item.name == name)
    }
}

impl ObjectTrait for Tree {
    /// Parse the concatenated `"<mode> <name>\0<20 raw>"` entries. Entry
    /// order is taken as-is; the payload is trusted to be canonical since
    /// the id was computed over these exact bytes.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let mut tree_items = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            let mode_end = rest.find_byte(b' ').ok_or_else(|| {
                GitError::InvalidTreeObject("missing mode terminator".to_string())
            })?;
            let mode = TreeItemMode::from_bytes(&rest[..mode_end])?;

            let name_end = rest[mode_end + 1..]
                .find_byte(b'\x00')
                .map(|p| p + mode_end + 1)
                .ok_or_else(|| {
                    GitError::InvalidTreeObject("missing name terminator".to_string())
                })?;
            let name = String::from_utf8_lossy(&rest[mode_end + 1..name_end]).to_string();
            validate_entry_name(&name)?;

            if rest.len() < name_end + 1 + HASH_SIZE {
                return Err(GitError::InvalidTreeObject(
                    "truncated entry hash".to_string(),
                ));
            }
            let id = ObjectHash::from_bytes(&rest[name_end + 1..name_end + 1 + HASH_SIZE])?;
            tree_items.push(TreeItem { mode, id, name });
            rest = &rest[name_end + 1 + HASH_SIZE..];
        }
        Ok(Tree {
            id: hash,
            tree_items,
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        for item in &self.tree_items {
            data.extend(item.to_data());
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::object::blob::Blob;

    fn blob_item(name: &str) -> TreeItem {
        TreeItem::new(
            TreeItemMode::Blob,
            Blob::from_content(name).id,
            name.to_string(),
        )
    }

    fn tree_item(name: &str) -> TreeItem {
        TreeItem::new(
            TreeItemMode::Tree,
            Blob::from_content(name).id,
            name.to_string(),
        )
    }

    /// The empty tree has the well-known Git id.
    #[test]
    fn test_empty_tree_id() {
        let tree = Tree::from_tree_items(vec![]).unwrap();
        assert_eq!(
            tree.id.to_string(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    /// A blob `foo` sorts before `foo.x`, but a directory `foo` after.
    #[test]
    fn test_directory_suffix_ordering() {
        let tree = Tree::from_tree_items(vec![tree_item("foo"), blob_item("foo.x")]).unwrap();
        let names: Vec<_> = tree.tree_items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["foo.x", "foo"]);

        let tree = Tree::from_tree_items(vec![blob_item("foo.x"), blob_item("foo")]).unwrap();
        let names: Vec<_> = tree.tree_items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["foo", "foo.x"]);
    }

    /// Input order does not influence the tree id.
    #[test]
    fn test_sort_is_canonical() {
        let a = Tree::from_tree_items(vec![blob_item("b"), blob_item("a"), tree_item("c")])
            .unwrap();
        let b = Tree::from_tree_items(vec![tree_item("c"), blob_item("a"), blob_item("b")])
            .unwrap();
        assert_eq!(a.id, b.id);
    }

    /// Serialization round-trips through from_bytes.
    #[test]
    fn test_round_trip() {
        let tree =
            Tree::from_tree_items(vec![blob_item("hello.txt"), tree_item("src")]).unwrap();
        let parsed = Tree::from_bytes(&tree.to_data().unwrap(), tree.id).unwrap();
        assert_eq!(parsed.tree_items, tree.tree_items);
        assert_eq!(parsed.object_hash().unwrap(), tree.id);
    }

    /// Entry names containing `/` or NUL, or empty names, are rejected.
    #[test]
    fn test_invalid_names() {
        assert!(Tree::from_tree_items(vec![blob_item("a/b")]).is_err());
        assert!(Tree::from_tree_items(vec![blob_item("")]).is_err());
    }

    /// Out-of-range modes are rejected on parse.
    #[test]
    fn test_invalid_mode() {
        assert!(TreeItemMode::from_bytes(b"100645").is_err());
        assert_eq!(
            TreeItemMode::from_bytes(b"040000").unwrap(),
            TreeItemMode::Tree
        );
        assert_eq!(
            TreeItemMode::from_bytes(b"40000").unwrap(),
            TreeItemMode::Tree
        );
    }

    /// Truncated payloads surface as InvalidTreeObject.
    #[test]
    fn test_truncated_payload() {
        let tree = Tree::from_tree_items(vec![blob_item("file")]).unwrap();
        let data = tree.to_data().unwrap();
        let err = Tree::from_bytes(&data[..data.len() - 4], tree.id).unwrap_err();
        assert!(matches!(err, GitError::InvalidTreeObject(_)));
    }
}
