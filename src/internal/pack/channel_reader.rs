//! Synchronous [`BufRead`] adapter over a channel of byte chunks.
//!
//! The fetch orchestrator demultiplexes sideband-1 pack data on the async
//! side and feeds it through a bounded channel; the pack decoder runs in a
//! blocking task and pulls from this reader, so the whole response is
//! never buffered in one place.

use std::io::{self, BufRead, Read};
use std::sync::mpsc::Receiver;

use bytes::{Buf, Bytes};

/// Blocking reader over an `mpsc::Receiver<Bytes>`. A closed channel is
/// end-of-stream.
pub struct ChannelReader {
    rx: Receiver<Bytes>,
    current: Bytes,
}

impl ChannelReader {
    pub fn new(rx: Receiver<Bytes>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
        }
    }
}

impl BufRead for ChannelReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        while self.current.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.current = chunk,
                Err(_) => return Ok(&[]),
            }
        }
        Ok(self.current.as_ref())
    }

    fn consume(&mut self, amt: usize) {
        self.current.advance(amt);
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}
