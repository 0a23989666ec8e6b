//! Decoder for Git-style delta instructions that rebuilds a target object
//! from a base buffer and the instruction stream (base size + result size
//! + op codes).

use std::io::{ErrorKind, Read};

use super::utils;
use crate::errors::GitError;

const COPY_INSTRUCTION_FLAG: u8 = 1 << 7; // msb set => copy from base, otherwise inline data
const COPY_OFFSET_BYTES: u8 = 4;
const COPY_SIZE_BYTES: u8 = 3;
const COPY_ZERO_SIZE: usize = 0x10000;

/// Apply a delta stream to `base_info`, returning the reconstructed target
/// bytes.
///
/// The stream format matches Git's delta encoding:
/// - leading base size, then result size (varint)
/// - a sequence of ops: insert instructions (msb=0, lower 7 bits = literal
///   length) or copy instructions (msb=1, following bytes encode
///   offset/size with absent bytes zero; size zero means 0x10000).
///
/// The declared base size must match `base_info`, and the produced output
/// must match the declared result size; mismatches are fatal.
pub fn delta_decode(
    mut stream: &mut impl Read,
    base_info: &[u8],
) -> Result<Vec<u8>, GitError> {
    let base_size = utils::read_varint(&mut stream)?;
    if base_info.len() != base_size {
        return Err(GitError::DeltaObjectError(format!(
            "declared base size {base_size} does not match base length {}",
            base_info.len()
        )));
    }

    let result_size = utils::read_varint(&mut stream)?;
    let mut buffer = Vec::with_capacity(result_size);
    loop {
        // Instruction stream end means the new object is complete.
        let instruction = match utils::read_byte(stream) {
            Ok(instruction) => instruction,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => {
                return Err(GitError::DeltaObjectError(format!(
                    "wrong instruction in delta: {err}"
                )));
            }
        };

        if instruction & COPY_INSTRUCTION_FLAG == 0 {
            // Insert instruction; the byte itself is the literal length.
            if instruction == 0 {
                // Appending 0 bytes doesn't make sense, so git disallows it.
                return Err(GitError::DeltaObjectError(
                    "invalid data instruction".to_string(),
                ));
            }

            let mut data = vec![0; instruction as usize];
            stream
                .read_exact(&mut data)
                .map_err(|err| GitError::DeltaObjectError(format!("truncated insert: {err}")))?;
            buffer.extend_from_slice(&data);
        } else {
            // Copy instruction.
            let mut nonzero_bytes = instruction;
            let offset =
                utils::read_partial_int(&mut stream, COPY_OFFSET_BYTES, &mut nonzero_bytes)?;
            let mut size =
                utils::read_partial_int(&mut stream, COPY_SIZE_BYTES, &mut nonzero_bytes)?;
            if size == 0 {
                size = COPY_ZERO_SIZE;
            }
            let base_data = base_info.get(offset..(offset + size)).ok_or_else(|| {
                GitError::DeltaObjectError("invalid copy instruction".to_string())
            })?;
            buffer.extend_from_slice(base_data);
        }
    }

    if buffer.len() != result_size {
        return Err(GitError::DeltaObjectError(format!(
            "declared result size {result_size} does not match output length {}",
            buffer.len()
        )));
    }
    Ok(buffer)
}
