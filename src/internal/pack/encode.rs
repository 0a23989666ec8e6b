//! Pack builder: stages non-deltified objects and emits a version-2 pack
//! with its SHA-1 trailer.
//!
//! Each staged object is encoded immediately (variable-length type+size
//! header plus zlib-deflated payload) and appended to the staging storage:
//! a heap buffer, a temp file flushed per object, or a heap buffer that
//! spills to disk once a byte threshold is crossed. `emit` frames the
//! staged bytes with the pack header and trailer and can be called again
//! after a failed push; the staging storage is only released by `cleanup`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use flate2::{Compression, write::ZlibEncoder};
use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    errors::GitError,
    internal::pack::{PACK_MAGIC, PACK_VERSION, entry::Entry},
};

/// Default byte threshold at which `Auto` staging spills to disk.
pub const DEFAULT_SPILL_THRESHOLD: usize = 10 * 1024 * 1024;

/// Chunk size for the emitted stream.
const EMIT_CHUNK: usize = 64 * 1024;

/// Where the builder keeps staged object bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// A contiguous heap buffer.
    #[default]
    Memory,
    /// A temp file, written and flushed per object.
    Disk,
    /// Memory until the spill threshold is crossed, then disk.
    Auto,
}

enum Staging {
    Memory(Vec<u8>),
    Disk(NamedTempFile),
}

/// Builder for a single outgoing pack.
pub struct PackBuilder {
    mode: StorageMode,
    threshold: usize,
    staging: Option<Staging>,
    count: u32,
}

impl PackBuilder {
    pub fn new(mode: StorageMode) -> PackBuilder {
        Self::with_threshold(mode, DEFAULT_SPILL_THRESHOLD)
    }

    pub fn with_threshold(mode: StorageMode, threshold: usize) -> PackBuilder {
        PackBuilder {
            mode,
            threshold,
            // Disk mode also starts on the heap; the first add spills it.
            staging: Some(Staging::Memory(Vec::new())),
            count: 0,
        }
    }

    /// Whether any object has been staged.
    pub fn has_objects(&self) -> bool {
        self.count > 0
    }

    /// Number of staged objects.
    pub fn object_count(&self) -> u32 {
        self.count
    }

    /// Encode and stage one object. Objects written by this library are
    /// never deltified.
    pub fn add_object(&mut self, entry: &Entry) -> Result<(), GitError> {
        if self.staging.is_none() {
            return Err(GitError::BuilderCleanedUp);
        }

        let mut encoded = Vec::with_capacity(entry.data.len() / 2 + 16);
        encoded.extend(object_header(
            entry.obj_type.to_pack_type_u8(),
            entry.data.len(),
        ));
        let mut encoder = ZlibEncoder::new(encoded, Compression::default());
        encoder.write_all(&entry.data)?;
        let encoded = encoder.finish()?;

        let needs_spill = match self.staging.as_ref() {
            Some(Staging::Memory(buf)) => {
                self.mode == StorageMode::Disk
                    || (self.mode == StorageMode::Auto
                        && buf.len() + encoded.len() > self.threshold)
            }
            _ => false,
        };
        if needs_spill {
            if let Some(Staging::Memory(buf)) = self.staging.take() {
                let mut file = NamedTempFile::new()?;
                file.write_all(&buf)?;
                tracing::debug!(bytes = buf.len(), "pack staging spilled to disk");
                self.staging = Some(Staging::Disk(file));
            }
        }

        match self.staging.as_mut().expect("staging present") {
            Staging::Memory(buf) => buf.extend_from_slice(&encoded),
            Staging::Disk(file) => {
                file.write_all(&encoded)?;
                file.flush()?;
            }
        }
        self.count += 1;
        Ok(())
    }

    /// Emit the framed pack as a chunked stream: 12-byte header, staged
    /// object bytes, then the SHA-1 trailer over everything preceding it.
    ///
    /// Does not consume the staged state; a failed push may call `emit`
    /// again.
    pub fn emit(&self) -> Result<ReceiverStream<Result<Bytes, GitError>>, GitError> {
        let staging = self.staging.as_ref().ok_or(GitError::BuilderCleanedUp)?;

        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(PACK_MAGIC);
        header.extend_from_slice(&PACK_VERSION.to_be_bytes());
        header.extend_from_slice(&self.count.to_be_bytes());

        let body: BodySource = match staging {
            Staging::Memory(buf) => BodySource::Memory(Bytes::from(buf.clone())),
            Staging::Disk(file) => {
                // Reopen by handle so emit can run while the builder stays
                // borrowed; each emit reads from its own cursor.
                let reopened = file.as_file().try_clone()?;
                BodySource::File(reopened)
            }
        };

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tokio::task::spawn_blocking(move || {
            if let Err(err) = pump_pack(header, body, &tx) {
                let _ = tx.blocking_send(Err(err));
            }
        });
        Ok(ReceiverStream::new(rx))
    }

    /// Collect the emitted pack into one buffer. Convenience for small
    /// packs (the canonical empty pack in particular).
    pub fn emit_bytes(&self) -> Result<Bytes, GitError> {
        let staging = self.staging.as_ref().ok_or(GitError::BuilderCleanedUp)?;
        let mut out = Vec::new();
        out.extend_from_slice(PACK_MAGIC);
        out.extend_from_slice(&PACK_VERSION.to_be_bytes());
        out.extend_from_slice(&self.count.to_be_bytes());
        match staging {
            Staging::Memory(buf) => out.extend_from_slice(buf),
            Staging::Disk(file) => {
                let mut reopened = file.as_file().try_clone()?;
                reopened.seek(SeekFrom::Start(0))?;
                reopened.read_to_end(&mut out)?;
            }
        }
        let digest: [u8; 20] = Sha1::digest(&out).into();
        out.extend_from_slice(&digest);
        Ok(Bytes::from(out))
    }

    /// Release the staging buffer or temp file. Idempotence quirk: the
    /// second call returns [`GitError::BuilderCleanedUp`], which hot-path
    /// callers tolerate silently.
    pub fn cleanup(&mut self) -> Result<(), GitError> {
        if self.staging.take().is_none() {
            return Err(GitError::BuilderCleanedUp);
        }
        self.count = 0;
        Ok(())
    }
}

enum BodySource {
    Memory(Bytes),
    File(File),
}

/// Blocking pump: header, body chunks, trailer; hashes as it goes.
fn pump_pack(
    header: Vec<u8>,
    body: BodySource,
    tx: &tokio::sync::mpsc::Sender<Result<Bytes, GitError>>,
) -> Result<(), GitError> {
    let mut hasher = Sha1::new();
    hasher.update(&header);
    tx.blocking_send(Ok(Bytes::from(header)))
        .map_err(|_| GitError::NetworkError("pack stream receiver dropped".to_string()))?;

    match body {
        BodySource::Memory(bytes) => {
            hasher.update(&bytes);
            let mut rest = bytes;
            while !rest.is_empty() {
                let chunk = rest.split_to(rest.len().min(EMIT_CHUNK));
                tx.blocking_send(Ok(chunk)).map_err(|_| {
                    GitError::NetworkError("pack stream receiver dropped".to_string())
                })?;
            }
        }
        BodySource::File(mut file) => {
            file.seek(SeekFrom::Start(0))?;
            let mut buf = vec![0u8; EMIT_CHUNK];
            loop {
                let n = file.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n])))
                    .map_err(|_| {
                        GitError::NetworkError("pack stream receiver dropped".to_string())
                    })?;
            }
        }
    }

    let digest: [u8; 20] = hasher.finalize().into();
    tx.blocking_send(Ok(Bytes::copy_from_slice(&digest)))
        .map_err(|_| GitError::NetworkError("pack stream receiver dropped".to_string()))?;
    Ok(())
}

/// Variable-length object header: 3-bit type and 4-bit size LSBs in the
/// first byte, 7 size bits per continuation byte.
fn object_header(type_id: u8, mut size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    let mut byte = (type_id << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor};

    use super::*;
    use crate::internal::object::blob::Blob;
    use crate::internal::pack::decode;

    /// The empty pack is header plus trailer and decodes to zero objects.
    #[test]
    fn empty_pack_is_canonical() {
        let builder = PackBuilder::new(StorageMode::Memory);
        assert!(!builder.has_objects());
        let bytes = builder.emit_bytes().unwrap();
        assert_eq!(bytes.len(), 12 + 20);

        let pack = decode::decode(BufReader::new(Cursor::new(bytes.to_vec())), None).unwrap();
        assert_eq!(pack.number, 0);
    }

    /// Staged objects round-trip through emit and decode.
    #[test]
    fn memory_round_trip() {
        let mut builder = PackBuilder::new(StorageMode::Memory);
        let a = Blob::from_content("alpha");
        let b = Blob::from_content("beta");
        builder.add_object(&Entry::from(a.clone())).unwrap();
        builder.add_object(&Entry::from(b.clone())).unwrap();
        assert_eq!(builder.object_count(), 2);

        let bytes = builder.emit_bytes().unwrap();
        let pack = decode::decode(BufReader::new(Cursor::new(bytes.to_vec())), None).unwrap();
        assert_eq!(pack.number, 2);
        assert_eq!(pack.objects[0].hash, a.id);
        assert_eq!(pack.objects[1].hash, b.id);
    }

    /// Disk staging produces identical bytes to memory staging.
    #[test]
    fn disk_matches_memory() {
        let blob = Blob::from_content("same bytes either way");

        let mut mem = PackBuilder::new(StorageMode::Memory);
        mem.add_object(&Entry::from(blob.clone())).unwrap();
        let mut disk = PackBuilder::new(StorageMode::Disk);
        disk.add_object(&Entry::from(blob.clone())).unwrap();

        assert_eq!(mem.emit_bytes().unwrap(), disk.emit_bytes().unwrap());
    }

    /// Auto staging spills to disk once the threshold is crossed and keeps
    /// decoding correctly.
    #[test]
    fn auto_spills_past_threshold() {
        let mut builder = PackBuilder::with_threshold(StorageMode::Auto, 64);
        for i in 0..8 {
            let blob = Blob::from_content_bytes(vec![i as u8; 128]);
            builder.add_object(&Entry::from(blob)).unwrap();
        }
        let bytes = builder.emit_bytes().unwrap();
        let pack = decode::decode(BufReader::new(Cursor::new(bytes.to_vec())), None).unwrap();
        assert_eq!(pack.number, 8);
    }

    /// emit is repeatable: a failed push can resend without re-staging.
    #[test]
    fn emit_is_repeatable() {
        let mut builder = PackBuilder::new(StorageMode::Memory);
        builder
            .add_object(&Entry::from(Blob::from_content("retry me")))
            .unwrap();
        let first = builder.emit_bytes().unwrap();
        let second = builder.emit_bytes().unwrap();
        assert_eq!(first, second);
    }

    /// The streaming emit yields the same bytes as emit_bytes.
    #[tokio::test]
    async fn emit_stream_matches_bytes() {
        use tokio_stream::StreamExt;

        let mut builder = PackBuilder::new(StorageMode::Disk);
        builder
            .add_object(&Entry::from(Blob::from_content("streamed")))
            .unwrap();
        let expected = builder.emit_bytes().unwrap();

        let mut stream = builder.emit().unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, expected.to_vec());
    }

    /// Second cleanup returns the discriminable already-cleaned-up error.
    #[test]
    fn cleanup_twice_errors() {
        let mut builder = PackBuilder::new(StorageMode::Memory);
        builder.cleanup().unwrap();
        let err = builder.cleanup().unwrap_err();
        assert!(matches!(err, GitError::BuilderCleanedUp));
        assert!(matches!(
            builder.emit_bytes().unwrap_err(),
            GitError::BuilderCleanedUp
        ));
    }
}
