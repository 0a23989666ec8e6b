//! Nanogit is a stateless client library that speaks the Git Smart HTTP
//! Protocol v2 to read and mutate remote repositories without a local
//! working copy or object database.
//!
//! The crate is organized in three layers:
//!
//! - [`internal`] holds the object model (blob/tree/commit/tag), the pack
//!   file codec, and the zlib stream plumbing.
//! - [`protocol`] frames and unframes pkt-lines and drives the three Smart
//!   HTTP v2 endpoints over a pluggable transport.
//! - [`client`] exposes the high-level operations: ref listing and CRUD,
//!   object reads, commit diffing and listing, and the staged writer that
//!   composes a mutation locally and publishes it atomically via a ref
//!   update plus packfile push.

pub mod client;
pub mod delta;
pub mod errors;
pub mod hash;
pub mod internal;
pub mod protocol;
pub mod storage;

pub use client::{
    Client, ClientOptions, CommitDiffEntry, DiffStatus, FlatTree, FlatTreeEntry,
    ListCommitsOptions, Ref, StagedWriter,
};
pub use errors::GitError;
pub use hash::ObjectHash;
pub use internal::object::{
    blob::Blob,
    commit::Commit,
    signature::{Signature, SignatureType},
    tree::{Tree, TreeItem, TreeItemMode},
};
pub use internal::pack::encode::StorageMode;
