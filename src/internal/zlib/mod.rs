//! Zlib streaming support for pack payloads.

pub mod stream;
