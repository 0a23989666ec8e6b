//! The Tag object annotates another object (almost always a commit) with
//! a name, tagger identity, and message. Tags are parsed when a server
//! includes them in a pack; this library never writes them.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{ObjectTrait, signature::Signature, types::ObjectType},
};

/// An annotated tag and its content-addressed id.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: ObjectHash,
    pub object_hash: ObjectHash,
    pub object_type: ObjectType,
    pub tag_name: String,
    pub tagger: Signature,
    pub message: String,
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "object {}", self.object_hash)?;
        writeln!(f, "type {}", self.object_type)?;
        writeln!(f, "tag {}", self.tag_name)?;
        writeln!(f, "tagger {}", self.tagger)?;
        writeln!(f)?;
        writeln!(f, "{}", self.message)
    }
}

impl ObjectTrait for Tag {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let (headers, message) = match data.find(b"\n\n") {
            Some(pos) => (&data[..pos], &data[pos + 2..]),
            None => (data, &data[..0]),
        };

        let mut object_hash = None;
        let mut object_type = None;
        let mut tag_name = None;
        let mut tagger = None;

        for line in headers.lines() {
            if line.starts_with(b" ") {
                continue;
            }
            if let Some(rest) = line.strip_prefix(b"object ") {
                object_hash = Some(ObjectHash::from_str(&String::from_utf8_lossy(rest))?);
            } else if let Some(rest) = line.strip_prefix(b"type ") {
                object_type = Some(ObjectType::from_string(&String::from_utf8_lossy(rest))?);
            } else if let Some(rest) = line.strip_prefix(b"tag ") {
                tag_name = Some(String::from_utf8_lossy(rest).to_string());
            } else if line.starts_with(b"tagger ") {
                tagger = Some(Signature::from_data(line.to_vec())?);
            }
        }

        Ok(Tag {
            id: hash,
            object_hash: object_hash
                .ok_or_else(|| GitError::InvalidTagObject("missing object header".to_string()))?,
            object_type: object_type
                .ok_or_else(|| GitError::InvalidTagObject("missing type header".to_string()))?,
            tag_name: tag_name
                .ok_or_else(|| GitError::InvalidTagObject("missing tag header".to_string()))?,
            tagger: tagger
                .ok_or_else(|| GitError::InvalidTagObject("missing tagger header".to_string()))?,
            message: String::from_utf8_lossy(message).to_string(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(b"object ");
        data.extend(self.object_hash.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"type ");
        data.extend(self.object_type.to_string().as_bytes());
        data.push(0x0a);
        data.extend(b"tag ");
        data.extend(self.tag_name.as_bytes());
        data.push(0x0a);
        data.extend(self.tagger.to_data()?);
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());
        Ok(data)
    }
}
