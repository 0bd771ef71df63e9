//! Vellum: lazy, indexed reading and chunked writing of delimited and
//! fixed-width tabular text.
//!
//! A file is parsed once to discover record and field boundaries; cell
//! values materialize on demand from the shared byte region through the
//! recorded index. The crates underneath split the work the same way
//! the data flows:
//!
//! - [`vellum_source`]: byte regions (mmap or owned) and compression
//!   recognition.
//! - [`vellum_index`]: the parallel, quote-aware delimited indexer, the
//!   fixed-width indexer, and the multi-file logical index.
//! - [`vellum_table`]: type inference, converters, the lazy column
//!   store, and the [`Table`] surface.
//! - [`vellum_write`]: the chunked, multi-threaded writer.
//!
//! This crate re-exports the public surface and provides the top-level
//! entry points: [`read`], [`read_many`], [`read_fwf`], and [`write`].
//!
//! ```no_run
//! use vellum::{ReadOptions, read};
//!
//! # fn main() -> vellum::Result<()> {
//! let table = read("measurements.csv", &ReadOptions::default())?;
//! for row in table.iter_rows() {
//!     let row = row?;
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use rayon::prelude::*;

pub use vellum_index::{
    FieldIndex, FwfConfig, FwfLayout, IndexConfig, MultiIndex, Progress, ProgressConfig,
    ProgressSink, index_delimited, index_fixed_width,
};
pub use vellum_result::{Error, Result};
pub use vellum_source::{ByteSource, Codec};
pub use vellum_table::{
    ColSelect, ColSelector, ColumnType, Locale, Problem, Table, TableConfig, Value,
};
pub use vellum_write::{LineEnding, QuotePolicy, WriteOptions, write_rows, write_table_to_writer};

use vellum_index::IndexedFile;

/// Environment variable overriding the configured thread count.
pub const THREADS_ENV: &str = "READER_THREADS";

/// Options for reading delimited files.
///
/// The defaults read a quoted, guessed-delimiter file with a header,
/// trimming whitespace and treating `NA` and empty fields as missing.
#[derive(Clone)]
pub struct ReadOptions {
    /// Field delimiter; guessed from a sample when absent.
    pub delim: Option<u8>,
    /// Disable quote handling entirely by setting this to `None`.
    pub quote: Option<u8>,
    pub escape_double: bool,
    pub escape_backslash: bool,
    pub trim_ws: bool,
    pub comment: Option<u8>,
    pub skip: usize,
    pub n_max: Option<u64>,
    pub has_header: bool,
    /// Replacement column names, by position.
    pub col_names: Option<Vec<String>>,
    /// Output projection, optionally renaming columns.
    pub col_select: Option<Vec<ColSelect>>,
    /// Per-column type overrides, by name.
    pub col_types: Vec<(String, ColumnType)>,
    /// Per-column temporal format overrides, by name.
    pub col_formats: Vec<(String, String)>,
    pub na_strings: Vec<String>,
    pub guess_max: usize,
    pub locale: Locale,
    /// Worker count; `None` falls back to `READER_THREADS`, then to the
    /// machine's parallelism.
    pub num_threads: Option<usize>,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub cancel: Option<Arc<AtomicBool>>,
    /// Synthesize a leading column carrying each row's source path.
    pub id_column_name: Option<String>,
    /// Require identical header names across a multi-file read.
    pub check_multi_file_names: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadOptions {
    /// The documented defaults.
    pub fn new() -> Self {
        Self {
            delim: None,
            quote: Some(b'"'),
            escape_double: true,
            escape_backslash: false,
            trim_ws: true,
            comment: None,
            skip: 0,
            n_max: None,
            has_header: true,
            col_names: None,
            col_select: None,
            col_types: Vec::new(),
            col_formats: Vec::new(),
            na_strings: vec!["NA".to_string(), String::new()],
            guess_max: vellum_table::infer::DEFAULT_GUESS_MAX,
            locale: Locale::default(),
            num_threads: None,
            progress: None,
            cancel: None,
            id_column_name: None,
            check_multi_file_names: true,
        }
    }

    fn index_config(&self) -> IndexConfig {
        IndexConfig {
            delim: self.delim,
            quote: self.quote,
            escape_double: self.escape_double,
            escape_backslash: self.escape_backslash,
            trim_ws: self.trim_ws,
            comment: self.comment,
            skip: self.skip,
            n_max: self.n_max,
            has_header: self.has_header,
            num_threads: resolve_threads(self.num_threads),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
        }
    }

    fn table_config(&self) -> TableConfig {
        TableConfig {
            na_strings: self.na_strings.clone(),
            guess_max: self.guess_max,
            locale: self.locale.clone(),
            col_names: self.col_names.clone(),
            col_types: self.col_types.clone(),
            col_formats: self.col_formats.clone(),
            col_select: self.col_select.clone(),
            id_column_name: self.id_column_name.clone(),
        }
    }
}

/// Options for reading fixed-width files.
#[derive(Clone)]
pub struct FwfOptions {
    pub trim_ws: bool,
    pub comment: Option<u8>,
    pub skip: usize,
    pub n_max: Option<u64>,
    pub col_select: Option<Vec<ColSelect>>,
    pub col_types: Vec<(String, ColumnType)>,
    pub col_formats: Vec<(String, String)>,
    pub na_strings: Vec<String>,
    pub guess_max: usize,
    pub locale: Locale,
    pub cancel: Option<Arc<AtomicBool>>,
    pub id_column_name: Option<String>,
}

impl Default for FwfOptions {
    fn default() -> Self {
        Self {
            trim_ws: true,
            comment: None,
            skip: 0,
            n_max: None,
            col_select: None,
            col_types: Vec::new(),
            col_formats: Vec::new(),
            na_strings: vec!["NA".to_string(), String::new()],
            guess_max: vellum_table::infer::DEFAULT_GUESS_MAX,
            locale: Locale::default(),
            cancel: None,
            id_column_name: None,
        }
    }
}

impl FwfOptions {
    fn fwf_config(&self) -> FwfConfig {
        FwfConfig {
            trim_ws: self.trim_ws,
            comment: self.comment,
            skip: self.skip,
            n_max: self.n_max,
            cancel: self.cancel.clone(),
        }
    }

    fn table_config(&self) -> TableConfig {
        TableConfig {
            na_strings: self.na_strings.clone(),
            guess_max: self.guess_max,
            locale: self.locale.clone(),
            col_names: None,
            col_types: self.col_types.clone(),
            col_formats: self.col_formats.clone(),
            col_select: self.col_select.clone(),
            id_column_name: self.id_column_name.clone(),
        }
    }
}

/// Worker count: explicit option, then `READER_THREADS`, then the
/// machine's parallelism.
pub fn resolve_threads(requested: Option<usize>) -> usize {
    requested
        .or_else(|| {
            std::env::var(THREADS_ENV)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
        })
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}

/// Read one delimited file into a [`Table`].
pub fn read(path: impl AsRef<Path>, options: &ReadOptions) -> Result<Table> {
    let path = path.as_ref();
    let source = Arc::new(ByteSource::open(path)?);
    read_parts(vec![(source, path.display().to_string())], options)
}

/// Read an in-memory byte region into a [`Table`].
pub fn read_source(source: ByteSource, options: &ReadOptions) -> Result<Table> {
    let label = source
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string());
    read_parts(vec![(Arc::new(source), label)], options)
}

/// Read several delimited files with identical configuration into one
/// logical [`Table`]. Indexes are built in parallel; files must agree
/// on column count and (by default) header names.
pub fn read_many(paths: &[impl AsRef<Path>], options: &ReadOptions) -> Result<Table> {
    let sources = paths
        .iter()
        .map(|p| {
            let p = p.as_ref();
            Ok((Arc::new(ByteSource::open(p)?), p.display().to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    read_parts(sources, options)
}

fn read_parts(sources: Vec<(Arc<ByteSource>, String)>, options: &ReadOptions) -> Result<Table> {
    let config = options.index_config();
    let parts: Vec<IndexedFile> = sources
        .into_par_iter()
        .map(|(source, path)| {
            let index = Arc::new(index_delimited(&source, &config)?);
            Ok(IndexedFile {
                source,
                index,
                path,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    for part in &parts {
        part.source.advise_random();
    }
    let multi = MultiIndex::new(parts, options.check_multi_file_names)?;
    Table::new(multi, options.table_config())
}

/// Read one fixed-width file into a [`Table`].
pub fn read_fwf(
    path: impl AsRef<Path>,
    layout: &FwfLayout,
    options: &FwfOptions,
) -> Result<Table> {
    let path = path.as_ref();
    let source = Arc::new(ByteSource::open(path)?);
    read_fwf_parts(vec![(source, path.display().to_string())], layout, options)
}

/// Read an in-memory fixed-width region into a [`Table`].
pub fn read_fwf_source(
    source: ByteSource,
    layout: &FwfLayout,
    options: &FwfOptions,
) -> Result<Table> {
    let label = source
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<memory>".to_string());
    read_fwf_parts(vec![(Arc::new(source), label)], layout, options)
}

fn read_fwf_parts(
    sources: Vec<(Arc<ByteSource>, String)>,
    layout: &FwfLayout,
    options: &FwfOptions,
) -> Result<Table> {
    let config = options.fwf_config();
    let parts: Vec<IndexedFile> = sources
        .into_iter()
        .map(|(source, path)| {
            let index = Arc::new(index_fixed_width(&source, layout, &config)?);
            Ok(IndexedFile {
                source,
                index,
                path,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let multi = MultiIndex::new(parts, true)?;
    Table::new(multi, options.table_config())
}

/// Write a table to `path`, compressing when the suffix names a codec.
pub fn write(table: &Table, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
    vellum_write::write_table(table, path, options)
}
