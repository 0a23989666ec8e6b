//! The Commit object records a snapshot of the repository: the root tree
//! id, zero or more parent commit ids, author and committer identities,
//! and the message. Encoded textually as `\n`-separated headers, a blank
//! line, then the message.
//!
//! Multi-parent merge commits are parsed (all parents retained) but never
//! written by this library; the staged writer emits single-parent commits
//! only.

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{ObjectTrait, signature::Signature, types::ObjectType},
};

/// A commit object and its content-addressed id.
#[derive(Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: ObjectHash,
    pub tree_id: ObjectHash,
    pub parent_commit_ids: Vec<ObjectHash>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "commit {}", self.id)?;
        writeln!(f, "tree {}", self.tree_id)?;
        for parent in &self.parent_commit_ids {
            writeln!(f, "parent {parent}")?;
        }
        writeln!(f, "author {}", self.author)?;
        writeln!(f, "committer {}", self.committer)?;
        writeln!(f)?;
        writeln!(f, "{}", self.message)
    }
}

impl Commit {
    /// Build a commit and compute its id from the canonical form.
    pub fn new(
        author: Signature,
        committer: Signature,
        tree_id: ObjectHash,
        parent_commit_ids: Vec<ObjectHash>,
        message: &str,
    ) -> Commit {
        let mut commit = Commit {
            id: ObjectHash::ZERO,
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message: message.to_string(),
        };
        commit.id =
            ObjectHash::from_type_and_data(ObjectType::Commit, &commit.to_data().unwrap());
        commit
    }

    /// The first parent, if any.
    pub fn first_parent(&self) -> Option<ObjectHash> {
        self.parent_commit_ids.first().copied()
    }

    /// First non-empty line of the message.
    pub fn summary(&self) -> &str {
        self.message
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
    }
}

impl ObjectTrait for Commit {
    /// Parse the textual commit encoding. `tree`, `author`, and
    /// `committer` headers are required; unknown headers (e.g. `gpgsig`
    /// and its continuation lines) are skipped.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        let (headers, message) = match data.find(b"\n\n") {
            Some(pos) => (&data[..pos], &data[pos + 2..]),
            None => (data, &data[..0]),
        };

        let mut tree_id = None;
        let mut parent_commit_ids = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            if line.starts_with(b" ") {
                // continuation of a multi-line header such as gpgsig
                continue;
            }
            if let Some(rest) = line.strip_prefix(b"tree ") {
                tree_id = Some(ObjectHash::from_str(&String::from_utf8_lossy(rest))?);
            } else if let Some(rest) = line.strip_prefix(b"parent ") {
                parent_commit_ids.push(ObjectHash::from_str(&String::from_utf8_lossy(rest))?);
            } else if line.starts_with(b"author ") {
                author = Some(Signature::from_data(line.to_vec())?);
            } else if line.starts_with(b"committer ") {
                committer = Some(Signature::from_data(line.to_vec())?);
            }
        }

        let tree_id = tree_id
            .ok_or_else(|| GitError::InvalidCommitObject("missing tree header".to_string()))?;
        let author = author
            .ok_or_else(|| GitError::InvalidCommitObject("missing author header".to_string()))?;
        let committer = committer.ok_or_else(|| {
            GitError::InvalidCommitObject("missing committer header".to_string())
        })?;

        Ok(Commit {
            id: hash,
            tree_id,
            parent_commit_ids,
            author,
            committer,
            message: String::from_utf8_lossy(message).to_string(),
        })
    }

    fn get_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    /// [Git-Internals-Git-Objects](https://git-scm.com/book/en/v2/Git-Internals-Git-Objects)
    fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();

        data.extend(b"tree ");
        data.extend(self.tree_id.to_string().as_bytes());
        data.push(0x0a);

        for parent in &self.parent_commit_ids {
            data.extend(b"parent ");
            data.extend(parent.to_string().as_bytes());
            data.push(0x0a);
        }

        data.extend(self.author.to_data()?);
        data.push(0x0a);
        data.extend(self.committer.to_data()?);
        data.push(0x0a);
        data.push(0x0a);
        data.extend(self.message.as_bytes());

        Ok(data)
    }
}
