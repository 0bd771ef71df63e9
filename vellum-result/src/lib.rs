//! Error types and result definitions for the Vellum tabular toolkit.
//!
//! Every Vellum crate returns [`Result<T>`] with the unified [`Error`]
//! enum. Structural failures (malformed quoting, I/O, codec, schema
//! mismatches across files) abort the call before any table is returned.
//! Per-cell parse failures and row-shape deviations are deliberately not
//! errors: they are recorded in the table's problem log and the offending
//! cell decodes as NA.

pub mod error;

pub use error::Error;

/// Result type used across the Vellum workspace.
pub type Result<T> = std::result::Result<T, Error>;
