//! Object type enumeration used across the object and pack modules.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// In Git, each object type is assigned a unique integer value which is used
/// to identify the type of the object inside a pack stream.
///
/// * `Commit` (1), `Tree` (2), `Blob` (3), `Tag` (4): base objects.
/// * `OffsetDelta` (6): a delta whose base is located by a backwards byte
///   offset within the same pack.
/// * `HashDelta` (7): a delta whose base is identified by its object id
///   (REF_DELTA on the wire).
///
/// Value 5 is reserved by the pack format and never appears.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
    OffsetDelta = 6,
    HashDelta,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tag => write!(f, "tag"),
            ObjectType::OffsetDelta => write!(f, "ofs-delta"),
            ObjectType::HashDelta => write!(f, "ref-delta"),
        }
    }
}

impl ObjectType {
    /// The ASCII type name used in the `"<type> <len>\0"` hash header.
    /// Delta kinds have no canonical name and must never be hashed.
    pub fn to_bytes(&self) -> &'static [u8] {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE,
            ObjectType::Tree => TREE_OBJECT_TYPE,
            ObjectType::Blob => BLOB_OBJECT_TYPE,
            ObjectType::Tag => TAG_OBJECT_TYPE,
            _ => panic!("delta object types have no canonical name"),
        }
    }

    /// Parse a string representation of a Git object type.
    pub fn from_string(s: &str) -> Result<ObjectType, GitError> {
        match s {
            "commit" => Ok(ObjectType::Commit),
            "tree" => Ok(ObjectType::Tree),
            "blob" => Ok(ObjectType::Blob),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(s.to_string())),
        }
    }

    /// Convert the object type to its 3-bit pack header type id.
    pub fn to_pack_type_u8(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
            ObjectType::OffsetDelta => 6,
            ObjectType::HashDelta => 7,
        }
    }

    /// Decode a 3-bit pack header type id.
    pub fn from_pack_type_u8(number: u8) -> Result<ObjectType, GitError> {
        match number {
            1 => Ok(ObjectType::Commit),
            2 => Ok(ObjectType::Tree),
            3 => Ok(ObjectType::Blob),
            4 => Ok(ObjectType::Tag),
            6 => Ok(ObjectType::OffsetDelta),
            7 => Ok(ObjectType::HashDelta),
            _ => Err(GitError::InvalidObjectType(format!(
                "invalid pack object type number: {number}"
            ))),
        }
    }

    /// Whether this type is a base object (not a delta).
    pub fn is_base(&self) -> bool {
        !matches!(self, ObjectType::OffsetDelta | ObjectType::HashDelta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Type names round-trip through the string form.
    #[test]
    fn test_object_type_from_string() {
        assert_eq!(ObjectType::from_string("blob").unwrap(), ObjectType::Blob);
        assert_eq!(ObjectType::from_string("tree").unwrap(), ObjectType::Tree);
        assert_eq!(
            ObjectType::from_string("commit").unwrap(),
            ObjectType::Commit
        );
        assert_eq!(ObjectType::from_string("tag").unwrap(), ObjectType::Tag);
        assert!(ObjectType::from_string("invalid_type").is_err());
    }

    /// Pack type ids map to and from the enum; 5 is rejected.
    #[test]
    fn test_pack_type_round_trip() {
        for ty in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
            ObjectType::OffsetDelta,
            ObjectType::HashDelta,
        ] {
            assert_eq!(
                ObjectType::from_pack_type_u8(ty.to_pack_type_u8()).unwrap(),
                ty
            );
        }
        assert!(ObjectType::from_pack_type_u8(5).is_err());
        assert!(ObjectType::from_pack_type_u8(0).is_err());
    }

    /// Only base types carry a canonical hash-header name.
    #[test]
    fn test_is_base() {
        assert!(ObjectType::Commit.is_base());
        assert!(ObjectType::Blob.is_base());
        assert!(!ObjectType::OffsetDelta.is_base());
        assert!(!ObjectType::HashDelta.is_base());
    }
}
