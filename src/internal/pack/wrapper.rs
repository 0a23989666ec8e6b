//! Reader wrapper that tracks how many bytes of a pack have been consumed
//! while keeping a running SHA-1 for trailer verification.

use std::io::{self, BufRead, Read};

use sha1::{Digest, Sha1};

use crate::hash::ObjectHash;

/// [`Wrapper`] wraps a [`BufRead`] and hashes every byte that passes
/// through it, whether consumed via `read` or via `fill_buf`/`consume`.
///
/// The pack decoder snapshots [`Wrapper::final_hash`] after the last
/// object and before reading the 20-byte trailer, giving the checksum over
/// exactly the preceding pack bytes.
pub struct Wrapper<R> {
    inner: R,
    hash: Sha1,
    bytes_read: u64,
}

impl<R> Wrapper<R>
where
    R: BufRead,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hash: Sha1::new(),
            bytes_read: 0,
        }
    }

    /// Number of bytes consumed so far; pack object offsets are measured
    /// with this counter.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// SHA-1 of the bytes consumed so far (the internal state is cloned and
    /// finalized, leaving the running hash untouched).
    pub fn final_hash(&self) -> ObjectHash {
        let digest: [u8; 20] = self.hash.clone().finalize().into();
        ObjectHash(digest)
    }
}

impl<R> BufRead for Wrapper<R>
where
    R: BufRead,
{
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if amt > 0 {
            let buffer = self
                .inner
                .fill_buf()
                .expect("consume after successful fill_buf");
            self.hash.update(&buffer[..amt]);
        }
        self.inner.consume(amt);
        self.bytes_read += amt as u64;
    }
}

impl<R> Read for Wrapper<R>
where
    R: BufRead,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let o = self.inner.read(buf)?;
        self.hash.update(&buf[..o]);
        self.bytes_read += o as u64;
        Ok(o)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};

    use sha1::{Digest, Sha1};

    use super::*;

    /// Reading through the wrapper yields the data unchanged.
    #[test]
    fn test_wrapper_read() {
        let data = b"Hello, world!";
        let mut wrapper = Wrapper::new(BufReader::new(Cursor::new(data.as_ref())));

        let mut buffer = vec![0; data.len()];
        wrapper.read_exact(&mut buffer).unwrap();
        assert_eq!(buffer, data);
        assert_eq!(wrapper.bytes_read(), data.len() as u64);
    }

    /// The running hash matches a direct SHA-1 of the consumed bytes.
    #[test]
    fn test_wrapper_hash() {
        let data = b"Hello, world!";
        let mut wrapper = Wrapper::new(BufReader::new(Cursor::new(data.as_ref())));

        let mut buffer = vec![0; data.len()];
        wrapper.read_exact(&mut buffer).unwrap();

        let expected = ObjectHash::from_bytes(&Sha1::digest(data)).unwrap();
        assert_eq!(wrapper.final_hash(), expected);
    }

    /// Bytes consumed via the BufRead interface are hashed too.
    #[test]
    fn test_wrapper_bufread_consume() {
        let data = b"pack bytes";
        let mut wrapper = Wrapper::new(BufReader::new(Cursor::new(data.as_ref())));

        let available = wrapper.fill_buf().unwrap().len();
        wrapper.consume(available);

        let expected = ObjectHash::from_bytes(&Sha1::digest(data)).unwrap();
        assert_eq!(wrapper.final_hash(), expected);
        assert_eq!(wrapper.bytes_read(), data.len() as u64);
    }
}
