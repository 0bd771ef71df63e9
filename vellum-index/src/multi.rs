//! A logical index over several indexed files.
//!
//! Every part keeps its own byte region and field index; the adapter
//! only maps logical row numbers onto `(part, local row)` pairs and
//! verifies that the parts agree on shape.

use std::sync::Arc;

use vellum_result::{Error, Result};
use vellum_source::ByteSource;

use crate::FieldIndex;

/// One indexed file inside a [`MultiIndex`].
pub struct IndexedFile {
    pub source: Arc<ByteSource>,
    pub index: Arc<dyn FieldIndex>,
    pub path: String,
}

impl std::fmt::Debug for IndexedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Several per-file indexes stitched into one logical row space.
pub struct MultiIndex {
    parts: Vec<IndexedFile>,
    /// Cumulative row counts; `row_offsets[i]` is the first logical row
    /// of part `i`, with a trailing total.
    row_offsets: Vec<u64>,
}

impl std::fmt::Debug for MultiIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiIndex")
            .field("parts", &self.parts)
            .field("row_offsets", &self.row_offsets)
            .finish()
    }
}

impl MultiIndex {
    /// Assemble parts, verifying that every file matches the first
    /// file's column count and (when `check_names`) its header names.
    pub fn new(parts: Vec<IndexedFile>, check_names: bool) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(Error::InvalidArgumentError(
                "at least one file is required".into(),
            ));
        };
        let expected = first.index.column_count();
        let expected_names = first.index.names();

        for part in &parts[1..] {
            let found = part.index.column_count();
            if found != expected {
                return Err(Error::SchemaMismatch {
                    path: part.path.clone(),
                    expected,
                    found,
                });
            }
            if check_names && part.index.names() != expected_names {
                return Err(Error::InvalidArgumentError(format!(
                    "column names in '{}' differ from '{}'",
                    part.path, first.path
                )));
            }
        }

        let mut row_offsets = Vec::with_capacity(parts.len() + 1);
        let mut total = 0u64;
        for part in &parts {
            row_offsets.push(total);
            total += part.index.row_count();
        }
        row_offsets.push(total);

        Ok(Self { parts, row_offsets })
    }

    pub fn row_count(&self) -> u64 {
        *self.row_offsets.last().unwrap_or(&0)
    }

    pub fn column_count(&self) -> usize {
        self.parts.first().map_or(0, |p| p.index.column_count())
    }

    pub fn names(&self) -> &[String] {
        self.parts.first().map_or(&[], |p| p.index.names())
    }

    pub fn parts(&self) -> &[IndexedFile] {
        &self.parts
    }

    /// Map a logical row to its part and the row within that part.
    #[inline]
    pub fn locate(&self, row: u64) -> (usize, u64) {
        debug_assert!(row < self.row_count());
        let part = self.row_offsets.partition_point(|&off| off <= row) - 1;
        (part, row - self.row_offsets[part])
    }

    /// The source path of `part`, as recorded at open time.
    pub fn path(&self, part: usize) -> &str {
        &self.parts[part].path
    }
}
