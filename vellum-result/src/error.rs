use std::io;

use thiserror::Error;

/// Unified error type for all Vellum operations.
///
/// Errors propagate upward with the `?` operator. At the API boundary
/// callers can match on specific variants; everything here is fatal for
/// the call that produced it. Recoverable per-cell issues are reported
/// through the table problem log instead.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure while opening, mapping, or reading a source, or while
    /// flushing a sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arrow failure while building or assembling materialized arrays.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// No delimiter was supplied and none of the candidates produced a
    /// consistent per-line count in the sample.
    #[error("unable to guess the field delimiter from the input sample")]
    DelimiterUnknown,

    /// A closing quote was followed by something other than a delimiter,
    /// record end, or (with `trim_ws`) whitespace.
    #[error("malformed quoted field at byte offset {offset}")]
    MalformedQuote { offset: u64 },

    /// The input ended while inside a quoted field.
    #[error("unterminated quoted field opened at byte offset {offset}")]
    UnterminatedQuote { offset: u64 },

    /// A column selection or type override referenced a name that is not
    /// in the header.
    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },

    /// A file in a multi-file read disagrees with the first file's shape.
    #[error("schema mismatch in '{path}': expected {expected} columns, found {found}")]
    SchemaMismatch {
        path: String,
        expected: usize,
        found: usize,
    },

    /// A compression codec failed while decoding or encoding a stream.
    #[error("codec error: {0}")]
    Codec(String),

    /// The read was cancelled through the caller-supplied cancel flag.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid user input or API parameter.
    #[error("invalid argument: {0}")]
    InvalidArgumentError(String),

    /// Internal invariant violation. Indicates a bug in Vellum.
    #[error("an internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap any displayable decode/encode failure as a codec error.
    #[inline]
    pub fn codec<E: std::fmt::Display>(err: E) -> Self {
        Error::Codec(err.to_string())
    }
}
