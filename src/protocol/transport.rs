//! Transport abstraction for the three Smart HTTP v2 endpoints.
//!
//! The client operations are written against this trait so tests can
//! script responses without a network; [`super::http::HttpTransport`] is
//! the production implementation.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::{errors::GitError, protocol::pkt_line::{self, Pkt}};

/// Type alias for protocol data streams to reduce nesting.
pub type ProtocolStream = Pin<Box<dyn Stream<Item = Result<Bytes, GitError>> + Send>>;

/// Wrap a single buffer as a [`ProtocolStream`].
pub fn stream_from_bytes(bytes: Bytes) -> ProtocolStream {
    Box::pin(futures::stream::once(async move { Ok(bytes) }))
}

/// One connection to a remote repository, speaking protocol v2.
#[async_trait]
pub trait SmartTransport: Send + Sync {
    /// `GET <base>/info/refs?service=git-upload-pack`: the capability
    /// probe. Distinguishes reachable (Ok), `Unauthorized`, and
    /// `RepoNotFound`.
    async fn probe(&self) -> Result<(), GitError>;

    /// `POST <base>/git-upload-pack` with a pkt-line request body,
    /// returning the streamed response.
    async fn upload_pack(&self, body: Bytes) -> Result<ProtocolStream, GitError>;

    /// `POST <base>/git-receive-pack` with a streamed body (ref command
    /// pkt-lines plus the embedded pack), returning the buffered
    /// report-status response.
    async fn receive_pack(&self, body: ProtocolStream) -> Result<Bytes, GitError>;
}

/// Incremental pkt-line reader over a [`ProtocolStream`].
///
/// Buffers just enough of the response to hand out one frame at a time, so
/// a pack embedded in a fetch response flows through without being held
/// whole.
pub struct PktReader {
    inner: ProtocolStream,
    buf: BytesMut,
    eof: bool,
}

impl PktReader {
    pub fn new(inner: ProtocolStream) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            eof: false,
        }
    }

    /// Next frame, or None at a clean end of stream. A stream ending
    /// inside a frame is a `ProtocolFraming` error.
    pub async fn next_pkt(&mut self) -> Result<Option<Pkt>, GitError> {
        loop {
            if let Some(pkt) = pkt_line::parse_pkt(&mut self.buf)? {
                return Ok(Some(pkt));
            }
            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(GitError::ProtocolFraming(format!(
                    "response ended inside a frame ({} trailing bytes)",
                    self.buf.len()
                )));
            }
            match self.inner.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None => self.eof = true,
            }
        }
    }

}
