//! SHA-1 object identifiers. Every object is addressed by the SHA-1 of
//! `"<type> <decimal-length>\0" || payload`; the all-zero value is a
//! reserved sentinel meaning "no such object" in ref update commands.

use std::{fmt::Display, io, str::FromStr};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::{errors::GitError, internal::object::types::ObjectType};

/// Byte length of a SHA-1 object id.
pub const HASH_SIZE: usize = 20;
/// Hex string length of a SHA-1 object id.
pub const HASH_HEX_LEN: usize = 40;

/// A 20-byte SHA-1 object id.
///
/// Supports conversion to/from hex strings, byte slices, and stream
/// reading. Equality is by-bytes; [`ObjectHash::ZERO`] is the reserved
/// zero-hash sentinel.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
pub struct ObjectHash(pub [u8; HASH_SIZE]);

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// Parse a 40-char hex string into an `ObjectHash`.
impl FromStr for ObjectHash {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HASH_HEX_LEN {
            return Err(GitError::InvalidHashValue(s.to_string()));
        }
        let bytes = hex::decode(s).map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(&bytes);
        Ok(ObjectHash(h))
    }
}

impl ObjectHash {
    /// The zero-hash sentinel ("no such object" / "no previous value").
    pub const ZERO: ObjectHash = ObjectHash([0u8; HASH_SIZE]);

    /// Whether this value is the zero-hash sentinel.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Compute the SHA-1 of raw data.
    pub fn new(data: &[u8]) -> ObjectHash {
        let digest = Sha1::digest(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(digest.as_ref());
        ObjectHash(bytes)
    }

    /// Compute an object id from its type and canonical payload, hashing
    /// the `"<type> <len>\0"` header followed by the payload.
    pub fn from_type_and_data(object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let mut hasher = Sha1::new();
        hasher.update(object_type.to_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update(b"\x00");
        hasher.update(data);
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(hasher.finalize().as_ref());
        ObjectHash(bytes)
    }

    /// Create an `ObjectHash` from exactly 20 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectHash, GitError> {
        if bytes.len() != HASH_SIZE {
            return Err(GitError::InvalidHashValue(format!(
                "invalid byte length: got {}, expected {}",
                bytes.len(),
                HASH_SIZE
            )));
        }
        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(bytes);
        Ok(ObjectHash(h))
    }

    /// Read 20 raw hash bytes from a stream.
    pub fn from_stream(data: &mut impl io::Read) -> io::Result<ObjectHash> {
        let mut h = [0u8; HASH_SIZE];
        data.read_exact(&mut h)?;
        Ok(ObjectHash(h))
    }

    /// Return the raw bytes of the hash.
    pub fn to_data(self) -> Vec<u8> {
        self.0.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    /// Hashing "Hello, world!" should match the known SHA-1 value.
    #[test]
    fn test_sha1_new() {
        let data = "Hello, world!".as_bytes();
        let sha1 = ObjectHash::new(data);
        assert_eq!(sha1.to_string(), "943a702d06f34599aee1f8da8ef9f7296031d699");
    }

    /// Object id must cover the "<type> <len>\0" header.
    #[test]
    fn test_from_type_and_data() {
        // `echo -n 'what is up, doc?' | git hash-object --stdin`
        let id = ObjectHash::from_type_and_data(ObjectType::Blob, b"what is up, doc?");
        assert_eq!(id.to_string(), "bd9dbf5aae1a3862dd1526723246b20206e5fc37");
    }

    /// Construct from raw bytes and round-trip through hex.
    #[test]
    fn test_from_bytes() {
        let sha1 = ObjectHash::from_bytes(&[
            0x8a, 0xb6, 0x86, 0xea, 0xfe, 0xb1, 0xf4, 0x47, 0x02, 0x73, 0x8c, 0x8b, 0x0f, 0x24,
            0xf2, 0x56, 0x7c, 0x36, 0xda, 0x6d,
        ])
        .unwrap();
        assert_eq!(sha1.to_string(), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
        assert_eq!(
            ObjectHash::from_str("8ab686eafeb1f44702738c8b0f24f2567c36da6d").unwrap(),
            sha1
        );
    }

    /// Wrong-length byte slices are rejected.
    #[test]
    fn test_from_bytes_wrong_len() {
        assert!(ObjectHash::from_bytes(&[0u8; 19]).is_err());
        assert!(ObjectHash::from_str("abcd").is_err());
    }

    /// Read hash bytes from a stream.
    #[test]
    fn test_from_stream() {
        let source = [
            0x8a, 0xb6, 0x86, 0xea, 0xfe, 0xb1, 0xf4, 0x47, 0x02, 0x73, 0x8c, 0x8b, 0x0f, 0x24,
            0xf2, 0x56, 0x7c, 0x36, 0xda, 0x6d,
        ];
        let mut reader = std::io::Cursor::new(source);
        let sha1 = ObjectHash::from_stream(&mut reader).unwrap();
        assert_eq!(sha1.to_string(), "8ab686eafeb1f44702738c8b0f24f2567c36da6d");
    }

    /// The zero sentinel formats as forty zeros and reports is_zero.
    #[test]
    fn test_zero_sentinel() {
        assert!(ObjectHash::ZERO.is_zero());
        assert_eq!(
            ObjectHash::ZERO.to_string(),
            "0000000000000000000000000000000000000000"
        );
        assert!(!ObjectHash::new(b"x").is_zero());
    }
}
