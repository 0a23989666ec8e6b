//! Streaming decoder for version-2 pack files.
//!
//! The input is a forward-only [`BufRead`] positioned at the `PACK` magic.
//! Each object header is parsed, its zlib payload inflated to stream-end
//! (the packed size is never assumed known), deltas are resolved against
//! objects seen earlier in the same pack or against the object store, and
//! the trailing SHA-1 over the whole pack is verified. Any inconsistency
//! fails the entire read; partial results are discarded.

use std::collections::HashMap;
use std::io::{BufRead, Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::{
    delta::delta_decode,
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::types::ObjectType,
        pack::{PACK_MAGIC, PACK_VERSION, entry::Entry, wrapper::Wrapper},
        zlib::stream::inflate::ReadBoxed,
    },
    storage::ObjectStore,
};

/// A fully decoded pack: object count, verified trailer, and the decoded
/// entries in stream order.
#[derive(Debug)]
pub struct Pack {
    pub number: usize,
    pub signature: ObjectHash,
    pub objects: Vec<Entry>,
}

/// Decode a whole pack stream.
///
/// When a `store` is supplied it serves two purposes: decoded entries are
/// added to it as they appear, and REF_DELTA bases missing from the pack
/// itself are looked up in it.
pub fn decode<R: BufRead>(
    reader: R,
    store: Option<&dyn ObjectStore>,
) -> Result<Pack, GitError> {
    let mut input = Wrapper::new(reader);

    let mut magic = [0u8; 4];
    input
        .read_exact(&mut magic)
        .map_err(|e| GitError::PackfileCorrupt(format!("truncated header: {e}")))?;
    if &magic != PACK_MAGIC {
        return Err(GitError::PackfileCorrupt(format!(
            "bad magic: {magic:02x?}"
        )));
    }
    let version = input
        .read_u32::<BigEndian>()
        .map_err(|e| GitError::PackfileCorrupt(format!("truncated version: {e}")))?;
    if version != PACK_VERSION {
        return Err(GitError::PackfileCorrupt(format!(
            "unsupported version: {version}"
        )));
    }
    let number = input
        .read_u32::<BigEndian>()
        .map_err(|e| GitError::PackfileCorrupt(format!("truncated object count: {e}")))?
        as usize;

    let mut objects: Vec<Entry> = Vec::with_capacity(number);
    let mut by_offset: HashMap<u64, usize> = HashMap::new();
    let mut by_hash: HashMap<ObjectHash, usize> = HashMap::new();

    for i in 0..number {
        let start_offset = input.bytes_read();
        let (obj_type, size) = read_object_header(&mut input)?;
        tracing::debug!(
            index = i,
            offset = start_offset,
            ?obj_type,
            size,
            "pack object header"
        );

        let entry = match obj_type {
            ty if ty.is_base() => {
                let mut boxed = ReadBoxed::new(&mut input, ty, size);
                let mut data = Vec::with_capacity(size);
                boxed
                    .read_to_end(&mut data)
                    .map_err(|e| GitError::PackfileCorrupt(format!("inflate failed: {e}")))?;
                if data.len() != size {
                    return Err(GitError::PackfileCorrupt(format!(
                        "object {i}: declared size {size}, inflated {}",
                        data.len()
                    )));
                }
                let hash = boxed.final_hash();
                Entry {
                    obj_type: ty,
                    data,
                    hash,
                }
            }
            ObjectType::OffsetDelta => {
                let negative = read_base_offset(&mut input)?;
                let base_offset = start_offset.checked_sub(negative).ok_or_else(|| {
                    GitError::PackfileCorrupt(format!(
                        "object {i}: base offset {negative} before pack start"
                    ))
                })?;
                let delta = inflate_delta(&mut input, size, i)?;
                let base = by_offset
                    .get(&base_offset)
                    .map(|&idx| &objects[idx])
                    .ok_or_else(|| {
                        GitError::MissingBase(format!("no object at pack offset {base_offset}"))
                    })?;
                resolve_delta(base.obj_type, &base.data, &delta)?
            }
            ObjectType::HashDelta => {
                let base_hash = ObjectHash::from_stream(&mut input)
                    .map_err(|e| GitError::PackfileCorrupt(format!("truncated base id: {e}")))?;
                let delta = inflate_delta(&mut input, size, i)?;
                let base = match by_hash.get(&base_hash) {
                    Some(&idx) => objects[idx].clone(),
                    None => match store.and_then(|s| s.get(&base_hash).transpose()) {
                        Some(found) => found?,
                        None => {
                            return Err(GitError::MissingBase(base_hash.to_string()));
                        }
                    },
                };
                resolve_delta(base.obj_type, &base.data, &delta)?
            }
            _ => unreachable!("header parser rejects other type ids"),
        };

        if let Some(store) = store {
            store.add(entry.clone())?;
        }
        by_offset.insert(start_offset, objects.len());
        by_hash.insert(entry.hash, objects.len());
        objects.push(entry);
    }

    // Checksum covers every pack byte before the trailer.
    let computed = input.final_hash();
    let declared = ObjectHash::from_stream(&mut input)
        .map_err(|e| GitError::PackfileCorrupt(format!("truncated trailer: {e}")))?;
    if computed != declared {
        return Err(GitError::PackfileCorrupt(format!(
            "checksum mismatch: computed {computed}, declared {declared}"
        )));
    }

    Ok(Pack {
        number,
        signature: declared,
        objects,
    })
}

/// Read the per-object variable-length header: 3-bit type, 4-bit size LSBs,
/// then 7 size bits per continuation byte.
fn read_object_header<R: BufRead>(input: &mut R) -> Result<(ObjectType, usize), GitError> {
    let mut byte = [0u8; 1];
    input
        .read_exact(&mut byte)
        .map_err(|e| GitError::PackfileCorrupt(format!("truncated object header: {e}")))?;
    let obj_type = ObjectType::from_pack_type_u8((byte[0] >> 4) & 0x07)
        .map_err(|e| GitError::PackfileCorrupt(e.to_string()))?;
    let mut size = (byte[0] & 0x0f) as usize;
    let mut shift = 4;
    while byte[0] & 0x80 != 0 {
        input
            .read_exact(&mut byte)
            .map_err(|e| GitError::PackfileCorrupt(format!("truncated size varint: {e}")))?;
        size |= ((byte[0] & 0x7f) as usize) << shift;
        shift += 7;
    }
    Ok((obj_type, size))
}

/// Read an OFS_DELTA base offset. Each byte contributes 7 bits; every
/// continuation adds a bias of `1 << 7k` so that zero is never a valid
/// encoding.
fn read_base_offset<R: BufRead>(input: &mut R) -> Result<u64, GitError> {
    let mut byte = [0u8; 1];
    input
        .read_exact(&mut byte)
        .map_err(|e| GitError::PackfileCorrupt(format!("truncated base offset: {e}")))?;
    let mut offset = (byte[0] & 0x7f) as u64;
    while byte[0] & 0x80 != 0 {
        input
            .read_exact(&mut byte)
            .map_err(|e| GitError::PackfileCorrupt(format!("truncated base offset: {e}")))?;
        offset = ((offset + 1) << 7) | (byte[0] & 0x7f) as u64;
    }
    Ok(offset)
}

/// Inflate a delta payload (no identity hash of its own).
fn inflate_delta<R: BufRead>(
    input: &mut R,
    size: usize,
    index: usize,
) -> Result<Vec<u8>, GitError> {
    let mut boxed = ReadBoxed::new_for_delta(input);
    let mut delta = Vec::with_capacity(size);
    boxed
        .read_to_end(&mut delta)
        .map_err(|e| GitError::PackfileCorrupt(format!("object {index}: inflate failed: {e}")))?;
    if delta.len() != size {
        return Err(GitError::PackfileCorrupt(format!(
            "object {index}: declared delta size {size}, inflated {}",
            delta.len()
        )));
    }
    Ok(delta)
}

/// Apply a delta to its base and rebuild the full entry, recomputing the
/// content hash.
fn resolve_delta(
    base_type: ObjectType,
    base_data: &[u8],
    delta: &[u8],
) -> Result<Entry, GitError> {
    let data = delta_decode(&mut Cursor::new(delta), base_data)?;
    let hash = ObjectHash::from_type_and_data(base_type, &data);
    Ok(Entry {
        obj_type: base_type,
        data,
        hash,
    })
}
