//! The lazy column store.
//!
//! A [`Column`] binds one output column to the shared multi-file index,
//! a type, and a converter. Scalar reads decode straight from the byte
//! region; [`Column::materialize`] converts the whole column into a
//! dense Arrow array exactly once, after which every read bypasses the
//! byte source. The column deliberately holds no reference back to the
//! table that owns it.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use arrow::array::{
    ArrayRef, BooleanArray, BooleanBuilder, Date32Array, Date32Builder, DictionaryArray,
    Float64Array, Float64Builder, Int32Array, Int64Array, Int64Builder, StringArray,
    StringBuilder, Time32SecondArray, Time32SecondBuilder, TimestampMicrosecondArray,
    TimestampMicrosecondBuilder,
};
use arrow::datatypes::Int32Type;
use rustc_hash::FxHashMap;
use vellum_index::{MultiIndex, decode_field};
use vellum_result::{Error, Result};

use crate::locale::Locale;
use crate::problems::{Problem, Problems};
use crate::types::{ColumnType, convert};
use crate::value::Value;

/// Scalar reads before a column materializes itself.
const AUTO_MATERIALIZE_MIN_READS: u64 = 64;

/// Where a column's cells come from.
#[derive(Debug)]
pub(crate) enum ColumnSource {
    /// A real column of the indexed files.
    Field { col: usize },
    /// The synthesized file-of-origin column of a multi-file read.
    Path,
}

/// One output column bound to the shared index and byte regions.
#[derive(Debug)]
pub struct Column {
    name: String,
    ty: ColumnType,
    format: Option<String>,
    source: ColumnSource,
    /// Position in the table's output schema, used in problem reports.
    out_col: usize,
    index: Arc<MultiIndex>,
    na_strings: Arc<Vec<String>>,
    locale: Arc<Locale>,
    problems: Arc<Problems>,
    reads: AtomicU64,
    claim: Mutex<()>,
    materialized: OnceLock<ArrayRef>,
}

impl Column {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        ty: ColumnType,
        format: Option<String>,
        source: ColumnSource,
        out_col: usize,
        index: Arc<MultiIndex>,
        na_strings: Arc<Vec<String>>,
        locale: Arc<Locale>,
        problems: Arc<Problems>,
    ) -> Self {
        Self {
            name,
            ty,
            format,
            source,
            out_col,
            index,
            na_strings,
            locale,
            problems,
            reads: AtomicU64::new(0),
            claim: Mutex::new(()),
            materialized: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> &ColumnType {
        &self.ty
    }

    /// The temporal format inference or the caller settled on.
    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized.get().is_some()
    }

    /// Read one cell. Parse failures decode as NA and are recorded in
    /// the problem log.
    pub fn get(&self, row: u64) -> Result<Value> {
        if row >= self.index.row_count() {
            return Err(Error::InvalidArgumentError(format!(
                "row {row} out of bounds for {} rows",
                self.index.row_count()
            )));
        }

        if let Some(array) = self.materialized.get() {
            return Ok(self.value_at(array, row as usize));
        }

        let reads = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        if reads >= (self.index.row_count() / 2).max(AUTO_MATERIALIZE_MIN_READS) {
            // Enough of the column has been touched that finishing the
            // conversion is cheaper than more scattered decodes.
            let array = self.materialize()?;
            return Ok(self.value_at(&array, row as usize));
        }

        self.read_lazy(row)
    }

    /// The dense Arrow array for this column, converting it now if no
    /// other thread has already done so. Exactly one thread performs
    /// the conversion; the rest block on the claim and then share it.
    pub fn materialize(&self) -> Result<ArrayRef> {
        if let Some(array) = self.materialized.get() {
            return Ok(Arc::clone(array));
        }
        let _claim = self.claim.lock().unwrap();
        if let Some(array) = self.materialized.get() {
            return Ok(Arc::clone(array));
        }
        tracing::debug!(column = %self.name, ty = self.ty.label(), "materializing column");
        let array = self.build_array()?;
        let _ = self.materialized.set(Arc::clone(&array));
        Ok(array)
    }

    fn read_lazy(&self, row: u64) -> Result<Value> {
        let col = match &self.source {
            ColumnSource::Path => {
                let (part, _) = self.index.locate(row);
                return Ok(Value::Str(self.index.path(part).to_string()));
            }
            ColumnSource::Field { col } => *col,
        };
        match cell_bytes(&self.index, row, col, &self.na_strings)? {
            None => Ok(Value::Null),
            Some(bytes) => match convert(&bytes, &self.ty, self.format(), &self.locale) {
                Some(value) => Ok(value),
                None => {
                    self.record_failure(row, &bytes);
                    Ok(Value::Null)
                }
            },
        }
    }

    fn record_failure(&self, row: u64, bytes: &[u8]) {
        self.problems.push(Problem {
            row,
            col: self.out_col,
            expected: self.ty.label().to_string(),
            observed: String::from_utf8_lossy(bytes).into_owned(),
        });
    }

    fn build_array(&self) -> Result<ArrayRef> {
        let nrows = self.index.row_count() as usize;
        match &self.ty {
            ColumnType::Character | ColumnType::Skip => self.build_strings(nrows),
            ColumnType::Factor { levels, .. } => self.build_factor(nrows, levels),
            ColumnType::Logical => {
                let mut builder = BooleanBuilder::with_capacity(nrows);
                self.for_each_value(nrows, |v| match v {
                    Some(Value::Bool(b)) => builder.append_value(b),
                    _ => builder.append_null(),
                })?;
                Ok(Arc::new(builder.finish()))
            }
            ColumnType::Integer => {
                let mut builder = Int64Builder::with_capacity(nrows);
                self.for_each_value(nrows, |v| match v {
                    Some(Value::Int(i)) => builder.append_value(i),
                    _ => builder.append_null(),
                })?;
                Ok(Arc::new(builder.finish()))
            }
            ColumnType::Double | ColumnType::Number => {
                let mut builder = Float64Builder::with_capacity(nrows);
                self.for_each_value(nrows, |v| match v {
                    Some(Value::Float(x)) => builder.append_value(x),
                    _ => builder.append_null(),
                })?;
                Ok(Arc::new(builder.finish()))
            }
            ColumnType::Date => {
                let mut builder = Date32Builder::with_capacity(nrows);
                self.for_each_value(nrows, |v| match v {
                    Some(Value::Date(d)) => builder.append_value(d),
                    _ => builder.append_null(),
                })?;
                Ok(Arc::new(builder.finish()))
            }
            ColumnType::Time => {
                let mut builder = Time32SecondBuilder::with_capacity(nrows);
                self.for_each_value(nrows, |v| match v {
                    Some(Value::Time(t)) => builder.append_value(t),
                    _ => builder.append_null(),
                })?;
                Ok(Arc::new(builder.finish()))
            }
            ColumnType::Datetime => {
                let mut builder = TimestampMicrosecondBuilder::with_capacity(nrows);
                self.for_each_value(nrows, |v| match v {
                    Some(Value::Datetime(t)) => builder.append_value(t),
                    _ => builder.append_null(),
                })?;
                Ok(Arc::new(builder.finish()))
            }
        }
    }

    /// Run the lazy conversion over every row, translating converter
    /// misses into problem entries.
    fn for_each_value(
        &self,
        nrows: usize,
        mut emit: impl FnMut(Option<Value>),
    ) -> Result<()> {
        for row in 0..nrows as u64 {
            match &self.source {
                ColumnSource::Path => {
                    let (part, _) = self.index.locate(row);
                    emit(Some(Value::Str(self.index.path(part).to_string())));
                }
                ColumnSource::Field { col } => {
                    match cell_bytes(&self.index, row, *col, &self.na_strings)? {
                        None => emit(None),
                        Some(bytes) => {
                            let value = convert(&bytes, &self.ty, self.format(), &self.locale);
                            if value.is_none() {
                                self.record_failure(row, &bytes);
                            }
                            emit(value);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Character fast path: no `Value` round trip, and when no escape
    /// fired in the whole region the builder appends borrowed slices.
    fn build_strings(&self, nrows: usize) -> Result<ArrayRef> {
        let mut builder = StringBuilder::with_capacity(nrows, nrows * 8);
        for row in 0..nrows as u64 {
            match &self.source {
                ColumnSource::Path => {
                    let (part, _) = self.index.locate(row);
                    builder.append_value(self.index.path(part));
                }
                ColumnSource::Field { col } => {
                    match cell_bytes(&self.index, row, *col, &self.na_strings)? {
                        None => builder.append_null(),
                        Some(bytes) => match std::str::from_utf8(&bytes) {
                            Ok(s) => builder.append_value(s),
                            Err(_) => builder.append_value(String::from_utf8_lossy(&bytes)),
                        },
                    }
                }
            }
        }
        Ok(Arc::new(builder.finish()))
    }

    fn build_factor(&self, nrows: usize, levels: &[String]) -> Result<ArrayRef> {
        let explicit = !levels.is_empty();
        let mut level_keys: FxHashMap<String, i32> = FxHashMap::default();
        let mut level_values: Vec<String> = Vec::new();
        for level in levels {
            level_keys.insert(level.clone(), level_values.len() as i32);
            level_values.push(level.clone());
        }

        let mut keys: Vec<Option<i32>> = Vec::with_capacity(nrows);
        for row in 0..nrows as u64 {
            let ColumnSource::Field { col } = &self.source else {
                return Err(Error::Internal(
                    "path columns cannot be factors".into(),
                ));
            };
            match cell_bytes(&self.index, row, *col, &self.na_strings)? {
                None => keys.push(None),
                Some(bytes) => {
                    let s = String::from_utf8_lossy(&bytes).into_owned();
                    match level_keys.get(&s) {
                        Some(&key) => keys.push(Some(key)),
                        None if explicit => {
                            self.record_failure(row, &bytes);
                            keys.push(None);
                        }
                        None => {
                            // Inferred levels accrue in appearance order.
                            let key = level_values.len() as i32;
                            level_keys.insert(s.clone(), key);
                            level_values.push(s);
                            keys.push(Some(key));
                        }
                    }
                }
            }
        }

        let keys = Int32Array::from(keys);
        let values = Arc::new(StringArray::from(level_values));
        let dict = DictionaryArray::<Int32Type>::try_new(keys, values)?;
        Ok(Arc::new(dict))
    }

    /// Decode one value out of the materialized array.
    fn value_at(&self, array: &ArrayRef, row: usize) -> Value {
        use arrow::array::Array;
        if array.is_null(row) {
            return Value::Null;
        }
        match &self.ty {
            ColumnType::Logical => {
                let a = array.as_any().downcast_ref::<BooleanArray>().unwrap();
                Value::Bool(a.value(row))
            }
            ColumnType::Integer => {
                let a = array.as_any().downcast_ref::<Int64Array>().unwrap();
                Value::Int(a.value(row))
            }
            ColumnType::Double | ColumnType::Number => {
                let a = array.as_any().downcast_ref::<Float64Array>().unwrap();
                Value::Float(a.value(row))
            }
            ColumnType::Date => {
                let a = array.as_any().downcast_ref::<Date32Array>().unwrap();
                Value::Date(a.value(row))
            }
            ColumnType::Time => {
                let a = array.as_any().downcast_ref::<Time32SecondArray>().unwrap();
                Value::Time(a.value(row))
            }
            ColumnType::Datetime => {
                let a = array
                    .as_any()
                    .downcast_ref::<TimestampMicrosecondArray>()
                    .unwrap();
                Value::Datetime(a.value(row))
            }
            ColumnType::Character | ColumnType::Skip => {
                let a = array.as_any().downcast_ref::<StringArray>().unwrap();
                Value::Str(a.value(row).to_string())
            }
            ColumnType::Factor { .. } => {
                let a = array
                    .as_any()
                    .downcast_ref::<DictionaryArray<Int32Type>>()
                    .unwrap();
                let key = a.keys().value(row) as usize;
                let values = a.values().as_any().downcast_ref::<StringArray>().unwrap();
                Value::Str(values.value(key).to_string())
            }
        }
    }
}

/// Fetch and decode the raw content of one cell. `Ok(None)` is the NA
/// sentinel: a padded field or a byte-for-byte `na_strings` match.
pub(crate) fn cell_bytes<'a>(
    index: &'a MultiIndex,
    row: u64,
    col: usize,
    na_strings: &[String],
) -> Result<Option<Cow<'a, [u8]>>> {
    let (part_no, local_row) = index.locate(row);
    let part = &index.parts()[part_no];
    let Some(span) = part.index.span(local_row, col) else {
        return Ok(None);
    };
    let raw = part.source.slice(span.lo as usize, span.hi as usize)?;
    let decoded = decode_field(raw, part.index.decode_spec());
    if na_strings.iter().any(|na| na.as_bytes() == decoded.as_ref()) {
        return Ok(None);
    }
    Ok(Some(decoded))
}
