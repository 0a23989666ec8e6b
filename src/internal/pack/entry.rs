//! The common `{hash, type, bytes}` surface every object kind shares: the
//! record a pack stream decodes into, the unit the object store caches,
//! and the bridge back to the strongly typed object forms.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{
        ObjectTrait, blob::Blob, commit::Commit, tag::Tag, tree::Tree, types::ObjectType,
    },
};

/// One Git object in canonical serialized form.
#[derive(Eq, Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
    pub hash: ObjectHash,
}

impl Entry {
    /// Parse back into a typed blob. Fails when the type tag disagrees.
    pub fn to_blob(&self) -> Result<Blob, GitError> {
        self.expect_type(ObjectType::Blob)?;
        Blob::from_bytes(&self.data, self.hash)
    }

    /// Parse back into a typed commit.
    pub fn to_commit(&self) -> Result<Commit, GitError> {
        self.expect_type(ObjectType::Commit)?;
        Commit::from_bytes(&self.data, self.hash)
    }

    /// Parse back into a typed tree.
    pub fn to_tree(&self) -> Result<Tree, GitError> {
        self.expect_type(ObjectType::Tree)?;
        Tree::from_bytes(&self.data, self.hash)
    }

    fn expect_type(&self, expected: ObjectType) -> Result<(), GitError> {
        if self.obj_type != expected {
            return Err(GitError::UnexpectedObjectType {
                expected: expected.to_string(),
                actual: self.obj_type.to_string(),
            });
        }
        Ok(())
    }
}

/// Content addressing makes the type tag plus hash a complete identity.
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.obj_type == other.obj_type && self.hash == other.hash
    }
}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.obj_type.hash(state);
        self.hash.hash(state);
    }
}

impl From<Blob> for Entry {
    fn from(value: Blob) -> Self {
        Self {
            obj_type: ObjectType::Blob,
            data: value.data,
            hash: value.id,
        }
    }
}

impl From<Commit> for Entry {
    fn from(value: Commit) -> Self {
        Self {
            obj_type: ObjectType::Commit,
            data: value.to_data().expect("commit serialization is infallible"),
            hash: value.id,
        }
    }
}

impl From<Tree> for Entry {
    fn from(value: Tree) -> Self {
        Self {
            obj_type: ObjectType::Tree,
            data: value.to_data().expect("tree serialization is infallible"),
            hash: value.id,
        }
    }
}

impl From<Tag> for Entry {
    fn from(value: Tag) -> Self {
        Self {
            obj_type: ObjectType::Tag,
            data: value.to_data().expect("tag serialization is infallible"),
            hash: value.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Typed objects convert to entries and back.
    #[test]
    fn test_typed_round_trip() {
        let blob = Blob::from_content("entry payload");
        let entry = Entry::from(blob.clone());
        assert_eq!(entry.obj_type, ObjectType::Blob);
        assert_eq!(entry.to_blob().unwrap(), blob);
    }

    /// Converting to the wrong typed form is an UnexpectedObjectType.
    #[test]
    fn test_type_mismatch() {
        let entry = Entry::from(Blob::from_content("not a tree"));
        assert!(matches!(
            entry.to_tree().unwrap_err(),
            GitError::UnexpectedObjectType { .. }
        ));
        assert!(matches!(
            entry.to_commit().unwrap_err(),
            GitError::UnexpectedObjectType { .. }
        ));
    }

    /// Equality is by type tag and hash, not payload identity.
    #[test]
    fn test_equality() {
        let a = Entry::from(Blob::from_content("same"));
        let b = Entry::from(Blob::from_content("same"));
        assert_eq!(a, b);
    }
}
