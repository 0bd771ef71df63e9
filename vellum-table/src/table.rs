//! The table surface.
//!
//! A [`Table`] is a set of typed lazy columns over one logical index.
//! It never copies file bytes up front: construction costs one type
//! inference pass over the sampled rows, and everything else happens on
//! demand.

use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{Field, Schema};
use rustc_hash::FxHashMap;
use vellum_index::MultiIndex;
use vellum_result::{Error, Result};

use crate::column::{Column, ColumnSource};
use crate::infer::{DEFAULT_GUESS_MAX, TypeGuess, infer_types};
use crate::locale::Locale;
use crate::problems::{Problem, Problems};
use crate::types::ColumnType;
use crate::value::Value;

/// How one output column is picked from the source columns.
#[derive(Debug, Clone)]
pub enum ColSelector {
    /// Zero-based source column position.
    Position(usize),
    /// Source column name.
    Name(String),
}

/// One entry of a column selection, optionally renaming the column.
#[derive(Debug, Clone)]
pub struct ColSelect {
    pub selector: ColSelector,
    pub rename: Option<String>,
}

impl ColSelect {
    pub fn position(pos: usize) -> Self {
        Self {
            selector: ColSelector::Position(pos),
            rename: None,
        }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Self {
            selector: ColSelector::Name(name.into()),
            rename: None,
        }
    }

    pub fn renamed(mut self, rename: impl Into<String>) -> Self {
        self.rename = Some(rename.into());
        self
    }
}

/// Column-level configuration applied after indexing.
#[derive(Clone)]
pub struct TableConfig {
    /// Cells matching any of these byte-for-byte are NA.
    pub na_strings: Vec<String>,
    /// Records sampled by type inference.
    pub guess_max: usize,
    pub locale: Locale,
    /// Replacement column names, by position. Must match the width.
    pub col_names: Option<Vec<String>>,
    /// Per-column type overrides, by name (after `col_names`).
    pub col_types: Vec<(String, ColumnType)>,
    /// Per-column temporal format overrides, by name.
    pub col_formats: Vec<(String, String)>,
    /// Optional projection (with renames) of the output columns.
    pub col_select: Option<Vec<ColSelect>>,
    /// Synthesize a leading column carrying each row's source path.
    pub id_column_name: Option<String>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            na_strings: vec!["NA".to_string(), String::new()],
            guess_max: DEFAULT_GUESS_MAX,
            locale: Locale::default(),
            col_names: None,
            col_types: Vec::new(),
            col_formats: Vec::new(),
            col_select: None,
            id_column_name: None,
        }
    }
}

/// A set of typed lazy columns over one logical index.
#[derive(Debug)]
pub struct Table {
    index: Arc<MultiIndex>,
    columns: Vec<Column>,
    problems: Arc<Problems>,
}

impl Table {
    /// Bind columns to `index` per `config`: resolve names, infer or
    /// override types, apply the selection, and attach converters.
    pub fn new(index: MultiIndex, config: TableConfig) -> Result<Table> {
        let index = Arc::new(index);
        let ncols = index.column_count();

        let mut names: Vec<String> = index.names().to_vec();
        if let Some(replacement) = &config.col_names {
            if replacement.len() != ncols {
                return Err(Error::InvalidArgumentError(format!(
                    "{} column names supplied for {} columns",
                    replacement.len(),
                    ncols
                )));
            }
            names = replacement.clone();
        }

        let mut by_name: FxHashMap<&str, usize> = FxHashMap::default();
        for (pos, name) in names.iter().enumerate() {
            by_name.entry(name.as_str()).or_insert(pos);
        }

        let mut overrides: Vec<Option<ColumnType>> = vec![None; ncols];
        for (name, ty) in &config.col_types {
            let pos = *by_name
                .get(name.as_str())
                .ok_or_else(|| Error::UnknownColumn { name: name.clone() })?;
            overrides[pos] = Some(ty.clone());
        }
        let mut formats: Vec<Option<String>> = vec![None; ncols];
        for (name, fmt) in &config.col_formats {
            let pos = *by_name
                .get(name.as_str())
                .ok_or_else(|| Error::UnknownColumn { name: name.clone() })?;
            formats[pos] = Some(fmt.clone());
        }

        let needs_guess = overrides.iter().any(Option::is_none);
        let guesses: Vec<TypeGuess> = if needs_guess {
            infer_types(&index, &config.na_strings, config.guess_max, &config.locale)?
        } else {
            Vec::new()
        };

        // The output projection: (source column, name), in output order.
        let mut projection: Vec<(usize, String)> = match &config.col_select {
            None => names.iter().cloned().enumerate().collect(),
            Some(selection) => {
                let mut picked = Vec::with_capacity(selection.len());
                for entry in selection {
                    let pos = match &entry.selector {
                        ColSelector::Position(pos) => {
                            if *pos >= ncols {
                                return Err(Error::InvalidArgumentError(format!(
                                    "column position {pos} out of bounds for {ncols} columns"
                                )));
                            }
                            *pos
                        }
                        ColSelector::Name(name) => *by_name
                            .get(name.as_str())
                            .ok_or_else(|| Error::UnknownColumn { name: name.clone() })?,
                    };
                    // A selection rename wins over `col_names`.
                    let name = entry.rename.clone().unwrap_or_else(|| names[pos].clone());
                    picked.push((pos, name));
                }
                picked
            }
        };
        projection.retain(|(pos, _)| !matches!(overrides[*pos], Some(ColumnType::Skip)));

        let problems = Arc::new(Problems::default());
        let na_strings = Arc::new(config.na_strings.clone());
        let locale = Arc::new(config.locale.clone());

        let mut columns = Vec::with_capacity(projection.len() + 1);
        if let Some(id_name) = &config.id_column_name {
            columns.push(Column::new(
                id_name.clone(),
                ColumnType::Character,
                None,
                ColumnSource::Path,
                columns.len(),
                Arc::clone(&index),
                Arc::clone(&na_strings),
                Arc::clone(&locale),
                Arc::clone(&problems),
            ));
        }
        for (pos, name) in projection {
            let (ty, format) = match &overrides[pos] {
                Some(ty) => (ty.clone(), formats[pos].clone()),
                None => {
                    let guess = &guesses[pos];
                    (
                        guess.ty.clone(),
                        formats[pos].clone().or_else(|| guess.format.clone()),
                    )
                }
            };
            columns.push(Column::new(
                name,
                ty,
                format,
                ColumnSource::Field { col: pos },
                columns.len(),
                Arc::clone(&index),
                Arc::clone(&na_strings),
                Arc::clone(&locale),
                Arc::clone(&problems),
            ));
        }

        Ok(Table {
            index,
            columns,
            problems,
        })
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> u64 {
        self.index.row_count()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn types(&self) -> Vec<&ColumnType> {
        self.columns.iter().map(Column::column_type).collect()
    }

    /// Position of the named output column.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Read one cell.
    pub fn get(&self, col: usize, row: u64) -> Result<Value> {
        let column = self.columns.get(col).ok_or_else(|| {
            Error::InvalidArgumentError(format!(
                "column {col} out of bounds for {} columns",
                self.columns.len()
            ))
        })?;
        column.get(row)
    }

    /// The dense Arrow array for one column.
    pub fn materialize(&self, col: usize) -> Result<ArrayRef> {
        let column = self.columns.get(col).ok_or_else(|| {
            Error::InvalidArgumentError(format!(
                "column {col} out of bounds for {} columns",
                self.columns.len()
            ))
        })?;
        column.materialize()
    }

    /// Iterate whole rows in file order.
    pub fn iter_rows(&self) -> RowIter<'_> {
        RowIter {
            table: self,
            row: 0,
        }
    }

    /// All recorded problems: per-cell parse failures plus row-shape
    /// deviations, ordered by `(row, col)`.
    pub fn problems(&self) -> Vec<Problem> {
        let mut all = self.problems.snapshot();
        let mut row_base = 0u64;
        for part in self.index.parts() {
            for issue in part.index.shape_issues() {
                all.push(Problem {
                    row: row_base + issue.row,
                    col: issue.expected.min(issue.found),
                    expected: format!("{} fields", issue.expected),
                    observed: format!("{} fields", issue.found),
                });
            }
            row_base += part.index.row_count();
        }
        all.sort();
        all.dedup();
        all
    }

    /// Materialize every column into one Arrow `RecordBatch`.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());
        for (pos, column) in self.columns.iter().enumerate() {
            let array = self.materialize(pos)?;
            fields.push(Field::new(
                column.name(),
                array.data_type().clone(),
                true,
            ));
            arrays.push(array);
        }
        let schema = Arc::new(Schema::new(fields));
        if arrays.is_empty() {
            return RecordBatch::try_new_with_options(
                schema,
                arrays,
                &arrow::record_batch::RecordBatchOptions::new()
                    .with_row_count(Some(self.row_count() as usize)),
            )
            .map_err(Error::from);
        }
        RecordBatch::try_new(schema, arrays).map_err(Error::from)
    }
}

/// Row iterator; each item is the tuple of per-column reads.
pub struct RowIter<'a> {
    table: &'a Table,
    row: u64,
}

impl Iterator for RowIter<'_> {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.row >= self.table.row_count() {
            return None;
        }
        let row = self.row;
        self.row += 1;
        let mut out = Vec::with_capacity(self.table.column_count());
        for col in 0..self.table.column_count() {
            match self.table.get(col, row) {
                Ok(value) => out.push(value),
                Err(err) => return Some(Err(err)),
            }
        }
        Some(Ok(out))
    }
}
