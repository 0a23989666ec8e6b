//! Error types for the nanogit crate.
//!
//! This module defines a unified error enumeration used across object
//! parsing, pack encoding/decoding, pkt-line framing, the HTTP transport,
//! and the staged writer. It integrates with `thiserror` to provide rich
//! `Display` implementations and error source chaining where applicable.
//!
//! Notes:
//! - Each variant carries contextual details via its message payload.
//! - Transport failures with a known HTTP status keep the status so callers
//!   can apply retry policy.

use thiserror::Error;

#[derive(Error, Debug)]
/// Unified error enumeration for the nanogit library.
///
/// - Used across object parsing, pack encode/decode, wire framing, the
///   transport, and the staged writer.
/// - Implements `std::error::Error` via `thiserror`.
pub enum GitError {
    /// Invalid or unsupported git object type name.
    #[error("The `{0}` is not a valid git object type.")]
    InvalidObjectType(String),

    /// Malformed tree object.
    #[error("Not a valid git tree object: {0}")]
    InvalidTreeObject(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("The `{0}` is not a valid git tree item.")]
    InvalidTreeItem(String),

    /// Malformed commit object.
    #[error("Not a valid git commit object: {0}")]
    InvalidCommitObject(String),

    /// Malformed tag object.
    #[error("Not a valid git tag object: {0}")]
    InvalidTagObject(String),

    /// Malformed identity line ("Name <email> ts tz").
    #[error("The `{0}` is not a valid signature.")]
    InvalidSignature(String),

    /// Invalid SHA-1 hash formatting or value.
    #[error("The `{0}` is not a valid hash value.")]
    InvalidHashValue(String),

    /// Malformed pkt-line framing: bad length header, truncated frame, or
    /// an unknown sideband channel.
    #[error("Protocol framing error: {0}")]
    ProtocolFraming(String),

    /// The server replied with an `ERR ` pkt-line; the payload remainder is
    /// surfaced verbatim.
    #[error("Remote error: {0}")]
    RemoteProtocol(String),

    /// Malformed or inconsistent pack stream: bad magic/version, type out of
    /// range, inflation failure, size mismatch, or checksum mismatch.
    #[error("Packfile corrupt: {0}")]
    PackfileCorrupt(String),

    /// A delta object references a base neither seen earlier in the pack nor
    /// present in the object store.
    #[error("Missing delta base: {0}")]
    MissingBase(String),

    /// Delta object reconstruction error.
    #[error("Delta object error: {0}")]
    DeltaObjectError(String),

    /// Object missing from the server response or local caches.
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// The server response contained an object of an unexpected kind.
    #[error("Unexpected object type: wanted {expected}, got {actual}")]
    UnexpectedObjectType { expected: String, actual: String },

    /// The server response did not contain exactly one object of the
    /// requested kind.
    #[error("Unexpected object count: wanted {expected}, got {actual}")]
    UnexpectedObjectCount { expected: usize, actual: usize },

    /// Ref lookup failed.
    #[error("Ref not found: {0}")]
    RefNotFound(String),

    /// Ref creation precondition failed.
    #[error("Ref already exists: {0}")]
    RefAlreadyExists(String),

    /// The server rejected a ref update (`ng` status line or missing ack).
    #[error("Push rejected for `{refname}`: {reason}")]
    PushRejected { refname: String, reason: String },

    /// Unauthorized access (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// Repository not found (HTTP 404).
    #[error("Repository not found")]
    RepoNotFound,

    /// Non-2xx HTTP status other than 401/404.
    #[error("Transport error: status {status}: {reason}")]
    Transport { status: u16, reason: String },

    /// Network communication error below the HTTP layer.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The ambient cancellation signal fired mid-operation.
    #[error("Operation canceled")]
    Canceled,

    /// Caller-supplied path failed validation.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid function argument or client option.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation on a staged writer that was already cleaned up.
    #[error("Staged writer already cleaned up")]
    WriterCleanedUp,

    /// Second `cleanup` on the pack builder. Callers on the happy path
    /// tolerate this silently.
    #[error("Pack builder already cleaned up")]
    BuilderCleanedUp,

    /// I/O error from an underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl GitError {
    /// True for transport-level failures a caller may retry by policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GitError::Transport { .. } | GitError::NetworkError(_)
        )
    }
}
