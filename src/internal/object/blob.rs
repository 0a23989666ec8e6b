//! The Blob object stores the raw content of a file. It carries no name,
//! mode, or location; those live in the tree entries that reference it.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{ObjectTrait, types::ObjectType},
};

/// An opaque byte string addressed by its content hash.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Blob {
    pub id: ObjectHash,
    pub data: Vec<u8>,
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "blob {} ({} bytes)", self.id, self.data.len())
    }
}

impl Blob {
    /// Build a blob from raw content, computing its id.
    pub fn from_content_bytes(content: impl Into<Vec<u8>>) -> Blob {
        let data = content.into();
        let id = ObjectHash::from_type_and_data(ObjectType::Blob, &data);
        Blob { id, data }
    }

    /// Build a blob from string content.
    pub fn from_content(content: &str) -> Blob {
        Self::from_content_bytes(content.as_bytes().to_vec())
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        Ok(Blob {
            id: hash,
            data: data.to_vec(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Blob
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        Ok(self.data.clone())
    }
}
