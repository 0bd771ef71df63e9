//! Byte sources for the Vellum readers.
//!
//! A [`ByteSource`] is a finite, immutable, random-access byte region.
//! Uncompressed seekable files are memory mapped; everything else
//! (in-memory input, pipes, compressed files) lands in a single owned
//! buffer. The region is shared as `Arc<ByteSource>` between the index
//! and every column that reads through it, so the backing storage lives
//! exactly as long as the last reader.

pub mod compression;
pub mod region;

pub use compression::Codec;
pub use region::ByteSource;

/// Environment variable overriding the buffered-read chunk size used
/// when draining non-seekable inputs into memory.
pub const CONNECTION_SIZE_ENV: &str = "READER_CONNECTION_SIZE";

/// Default buffered-read chunk size (128 KiB).
pub const DEFAULT_CONNECTION_SIZE: usize = 1 << 17;

/// Buffered-read chunk size, honoring `READER_CONNECTION_SIZE`.
pub fn connection_size() -> usize {
    std::env::var(CONNECTION_SIZE_ENV)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_CONNECTION_SIZE)
}
