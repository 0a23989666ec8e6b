//! Pack file encoder/decoder implementations and stream wrappers that
//! faithfully follow the [pack-format spec](https://git-scm.com/docs/pack-format).
//!
//! The decoder consumes a v2 pack as a forward-only byte stream; the
//! encoder stages non-deltified objects in memory or a temp file and emits
//! a framed pack with its SHA-1 trailer on demand.

pub mod channel_reader;
pub mod decode;
pub mod encode;
pub mod entry;
pub mod wrapper;

/// 4-byte magic at the start of every pack.
pub const PACK_MAGIC: &[u8; 4] = b"PACK";
/// The only pack version this library reads and writes.
pub const PACK_VERSION: u32 = 2;

#[cfg(test)]
pub(crate) mod tests {
    use tracing_subscriber::util::SubscriberInitExt;

    /// CAUTION: This two is same
    /// 1.
    /// tracing_subscriber::fmt().init();
    ///
    /// 2.
    /// env::set_var("RUST_LOG", "debug"); // must be set if use `fmt::init()`, or no output
    /// tracing_subscriber::fmt::init();
    pub(crate) fn init_logger() {
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .with_target(false)
            .without_time()
            .with_level(true)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
            .try_init(); // avoid multi-init
    }
}
