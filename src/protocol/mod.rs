//! Wire protocol support for Git Smart HTTP v2: pkt-line framing, sideband
//! demultiplexing, and the HTTP transport the client operations drive.

pub mod http;
pub mod pkt_line;
pub mod transport;

pub use http::{Auth, HttpTransport};
pub use transport::{ProtocolStream, SmartTransport};
