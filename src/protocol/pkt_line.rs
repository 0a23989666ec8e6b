//! Pkt-line framing: `<4 hex length><payload>` where the length includes
//! the four header bytes, plus the three payload-less control frames and
//! the sideband channel convention used inside fetch `packfile` sections.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::GitError;

/// Flush frame: section / request terminator.
pub const FLUSH_PKT: &[u8; 4] = b"0000";
/// Delimiter frame: separates capability and argument sections.
pub const DELIM_PKT: &[u8; 4] = b"0001";
/// Response-end frame (stateless-RPC termination).
pub const RESPONSE_END_PKT: &[u8; 4] = b"0002";

/// Maximum payload of one data frame; writers must split above this.
pub const MAX_PKT_PAYLOAD: usize = 65516;

/// One parsed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pkt {
    Flush,
    Delim,
    ResponseEnd,
    Data(Bytes),
}

impl Pkt {
    /// The payload of a data frame, or None for control frames.
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            Pkt::Data(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Try to parse one frame from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer holds only part of a frame (the
/// caller reads more input); fails with `ProtocolFraming` when the length
/// header is not four hex digits or declares a length under 4.
pub fn parse_pkt(buf: &mut BytesMut) -> Result<Option<Pkt>, GitError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let header = core::str::from_utf8(&buf[..4])
        .map_err(|_| GitError::ProtocolFraming("length header is not ASCII hex".to_string()))?;
    let length = usize::from_str_radix(header, 16).map_err(|_| {
        GitError::ProtocolFraming(format!("length header is not hex: {header:?}"))
    })?;

    match length {
        0 => {
            buf.advance(4);
            Ok(Some(Pkt::Flush))
        }
        1 => {
            buf.advance(4);
            Ok(Some(Pkt::Delim))
        }
        2 => {
            buf.advance(4);
            Ok(Some(Pkt::ResponseEnd))
        }
        3 => Err(GitError::ProtocolFraming(
            "length 0003 is not a valid frame".to_string(),
        )),
        _ => {
            if buf.len() < length {
                return Ok(None);
            }
            buf.advance(4);
            let payload = buf.split_to(length - 4).freeze();
            Ok(Some(Pkt::Data(payload)))
        }
    }
}

/// Parse every frame of a complete buffer. Trailing partial data is a
/// framing error.
pub fn parse_all(input: Bytes) -> Result<Vec<Pkt>, GitError> {
    let mut buf = BytesMut::from(input.as_ref());
    let mut pkts = Vec::new();
    loop {
        match parse_pkt(&mut buf)? {
            Some(pkt) => pkts.push(pkt),
            None if buf.is_empty() => return Ok(pkts),
            None => {
                return Err(GitError::ProtocolFraming(format!(
                    "input ended inside a frame ({} trailing bytes)",
                    buf.len()
                )));
            }
        }
    }
}

/// Append one data frame carrying a string payload.
pub fn add_pkt_line_string(pkt_line_stream: &mut BytesMut, buf_str: String) {
    debug_assert!(buf_str.len() <= MAX_PKT_PAYLOAD);
    let length = buf_str.len() + 4;
    pkt_line_stream.put(Bytes::from(format!("{length:04x}")));
    pkt_line_stream.put(buf_str.as_bytes());
}

/// Append data frames for an arbitrary payload, splitting at the payload
/// cap.
pub fn add_pkt_line_bytes(pkt_line_stream: &mut BytesMut, mut payload: &[u8]) {
    loop {
        let take = payload.len().min(MAX_PKT_PAYLOAD);
        let length = take + 4;
        pkt_line_stream.put(Bytes::from(format!("{length:04x}")));
        pkt_line_stream.put(&payload[..take]);
        payload = &payload[take..];
        if payload.is_empty() {
            break;
        }
    }
}

/// Append a flush frame.
pub fn add_flush_pkt(pkt_line_stream: &mut BytesMut) {
    pkt_line_stream.put(&FLUSH_PKT[..]);
}

/// Append a delimiter frame.
pub fn add_delim_pkt(pkt_line_stream: &mut BytesMut) {
    pkt_line_stream.put(&DELIM_PKT[..]);
}

/// Sideband channels multiplexed inside a `packfile` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideBand {
    /// Pack data.
    PackfileData,
    /// Progress text, forwarded to the logger and never parsed.
    Progress,
    /// Fatal error; the payload is surfaced verbatim.
    Fatal,
}

impl SideBand {
    pub fn value(self) -> u8 {
        match self {
            SideBand::PackfileData => 1,
            SideBand::Progress => 2,
            SideBand::Fatal => 3,
        }
    }
}

/// Split a data payload into its sideband channel and remainder. Unknown
/// channel ids are a framing error; empty payloads lack the channel byte.
pub fn split_sideband(mut payload: Bytes) -> Result<(SideBand, Bytes), GitError> {
    if payload.is_empty() {
        return Err(GitError::ProtocolFraming(
            "empty sideband frame".to_string(),
        ));
    }
    let channel = payload.split_to(1)[0];
    let band = match channel {
        1 => SideBand::PackfileData,
        2 => SideBand::Progress,
        3 => SideBand::Fatal,
        other => {
            return Err(GitError::ProtocolFraming(format!(
                "unknown sideband channel {other}"
            )));
        }
    };
    Ok((band, payload))
}

/// Map an `ERR ` payload to its error, if the payload is one.
///
/// `"not our ref"` replies are how servers report a `want` for an object
/// they lack; those surface as `ObjectNotFound`.
pub fn check_err_pkt(payload: &[u8]) -> Option<GitError> {
    let text = payload.strip_prefix(b"ERR ")?;
    let message = String::from_utf8_lossy(text).trim_end().to_string();
    if message.contains("not our ref") {
        Some(GitError::ObjectNotFound(message))
    } else {
        Some(GitError::RemoteProtocol(message))
    }
}
