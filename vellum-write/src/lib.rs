//! Streaming, chunked, multi-threaded delimited output.
//!
//! Rows are grouped into chunks; a worker pool formats each chunk into
//! a private buffer, and a serializer reassembles the tagged buffers in
//! sequence order before appending them to the sink. Output lands in
//! row order regardless of which worker finished first.

pub mod format;
pub mod writer;

pub use format::{LineEnding, QuotePolicy, WriteOptions};
pub use writer::{write_rows, write_table, write_table_to_writer};
