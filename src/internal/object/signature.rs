//! Author/committer identity lines: `"<name> <email> <unix-ts> <tz>"`
//! prefixed by a signature kind inside commit and tag objects.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// Which header a signature occupies inside a commit or tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureType {
    Author,
    Committer,
    Tagger,
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SignatureType::Author => write!(f, "author"),
            SignatureType::Committer => write!(f, "committer"),
            SignatureType::Tagger => write!(f, "tagger"),
        }
    }
}

impl FromStr for SignatureType {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(SignatureType::Author),
            "committer" => Ok(SignatureType::Committer),
            "tagger" => Ok(SignatureType::Tagger),
            _ => Err(GitError::InvalidSignature(s.to_string())),
        }
    }
}

/// An identity plus its position in the object: name, email, timestamp in
/// seconds since the epoch, and a `±HHMM` timezone offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signature_type: SignatureType,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub timezone: String,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.timezone
        )
    }
}

impl Signature {
    /// Build a signature stamped with the current time, UTC offset.
    pub fn new(signature_type: SignatureType, name: String, email: String) -> Signature {
        Signature {
            signature_type,
            name,
            email,
            timestamp: chrono::Utc::now().timestamp(),
            timezone: "+0000".to_string(),
        }
    }

    /// Build a signature with an explicit timestamp and timezone.
    pub fn new_with_time(
        signature_type: SignatureType,
        name: String,
        email: String,
        timestamp: i64,
        timezone: String,
    ) -> Signature {
        Signature {
            signature_type,
            name,
            email,
            timestamp,
            timezone,
        }
    }

    /// Parse a full signature header line such as
    /// `author Name <email> 1717075200 +0800`.
    ///
    /// The timestamp and timezone are the trailing two whitespace-separated
    /// tokens; the email is bracketed by `<…>`; the name is everything
    /// before `<`, trimmed.
    pub fn from_data(data: Vec<u8>) -> Result<Signature, GitError> {
        let line = data.as_slice();
        let type_end = line
            .find_byte(b' ')
            .ok_or_else(|| GitError::InvalidSignature(String::from_utf8_lossy(line).to_string()))?;
        let signature_type =
            SignatureType::from_str(&String::from_utf8_lossy(&line[..type_end]))?;
        let rest = &line[type_end + 1..];

        let email_start = rest.find_byte(b'<').ok_or_else(|| {
            GitError::InvalidSignature(String::from_utf8_lossy(line).to_string())
        })?;
        let email_end = rest.find_byte(b'>').ok_or_else(|| {
            GitError::InvalidSignature(String::from_utf8_lossy(line).to_string())
        })?;
        if email_end < email_start {
            return Err(GitError::InvalidSignature(
                String::from_utf8_lossy(line).to_string(),
            ));
        }

        let name = String::from_utf8_lossy(&rest[..email_start]).trim().to_string();
        let email = String::from_utf8_lossy(&rest[email_start + 1..email_end]).to_string();

        let tail = String::from_utf8_lossy(&rest[email_end + 1..]).to_string();
        let mut tokens = tail.split_whitespace().rev();
        let timezone = tokens
            .next()
            .ok_or_else(|| GitError::InvalidSignature(tail.clone()))?
            .to_string();
        let timestamp: i64 = tokens
            .next()
            .ok_or_else(|| GitError::InvalidSignature(tail.clone()))?
            .parse()
            .map_err(|_| GitError::InvalidSignature(tail.clone()))?;

        Ok(Signature {
            signature_type,
            name,
            email,
            timestamp,
            timezone,
        })
    }

    /// Serialize back to the header line form, including the leading
    /// signature kind.
    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(self.signature_type.to_string().as_bytes());
        data.extend(b" ");
        data.extend(self.name.as_bytes());
        data.extend(b" <");
        data.extend(self.email.as_bytes());
        data.extend(b"> ");
        data.extend(self.timestamp.to_string().as_bytes());
        data.extend(b" ");
        data.extend(self.timezone.as_bytes());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse a well-formed author line.
    #[test]
    fn test_from_data() {
        let sig = Signature::from_data(
            b"author Eli Ma <eli@patch.dev> 1678101573 +0800".to_vec(),
        )
        .unwrap();
        assert_eq!(sig.signature_type, SignatureType::Author);
        assert_eq!(sig.name, "Eli Ma");
        assert_eq!(sig.email, "eli@patch.dev");
        assert_eq!(sig.timestamp, 1678101573);
        assert_eq!(sig.timezone, "+0800");
    }

    /// Serialization round-trips byte for byte.
    #[test]
    fn test_round_trip() {
        let line = b"committer A U Thor <author@example.com> 1717075200 -0500".to_vec();
        let sig = Signature::from_data(line.clone()).unwrap();
        assert_eq!(sig.to_data().unwrap(), line);
    }

    /// Negative timestamps (pre-epoch) parse as signed values.
    #[test]
    fn test_negative_timestamp() {
        let sig =
            Signature::from_data(b"author old timer <old@example.com> -62075 +0000".to_vec())
                .unwrap();
        assert_eq!(sig.timestamp, -62075);
    }

    /// Missing email brackets are rejected.
    #[test]
    fn test_missing_email() {
        assert!(Signature::from_data(b"author nobody 1678101573 +0800".to_vec()).is_err());
    }

    /// Unknown signature kinds are rejected.
    #[test]
    fn test_bad_kind() {
        assert!(
            Signature::from_data(b"reviewer R <r@example.com> 1678101573 +0800".to_vec()).is_err()
        );
    }
}
