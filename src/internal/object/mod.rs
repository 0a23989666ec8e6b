//! Object model definitions for Git blobs, trees, commits, and tags, plus
//! the trait that lets the pack and zlib layers create strongly typed
//! values from raw bytes.

pub mod blob;
pub mod commit;
pub mod signature;
pub mod tag;
pub mod tree;
pub mod types;

use std::fmt::Display;

use crate::{errors::GitError, hash::ObjectHash, internal::object::types::ObjectType};

/// **The Object Trait**
///
/// Common interface for all Git object types: blobs, trees, commits, and
/// tags. All share a content-addressed id over their canonical byte form.
pub trait ObjectTrait: Send + Sync + Display {
    /// Creates a new object from its canonical payload bytes.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized;

    /// Returns the type of the object.
    fn get_type(&self) -> ObjectType;

    /// Serialize the object to its canonical payload bytes.
    fn to_data(&self) -> Result<Vec<u8>, GitError>;

    /// Computes the object hash from the serialized data.
    fn object_hash(&self) -> Result<ObjectHash, GitError> {
        let data = self.to_data()?;
        Ok(ObjectHash::from_type_and_data(self.get_type(), &data))
    }
}
