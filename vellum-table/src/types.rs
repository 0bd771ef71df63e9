//! Column types and their converters.
//!
//! Types are a closed tagged variant; each carries its parsing rule
//! here and its materialized Arrow kind in the column store. Converters
//! receive fully decoded field content (trimmed, unquoted, unescaped)
//! and never see the NA sentinel, which is matched upstream.

use arrow::datatypes::{DataType, TimeUnit};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::locale::Locale;
use crate::value::{EPOCH_CE_DAYS, Value};

/// The closed set of column types.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Logical,
    Integer,
    Double,
    /// Double that tolerates grouping marks and currency glyphs.
    Number,
    Time,
    Date,
    Datetime,
    Character,
    /// Categorical strings. Empty `levels` means the levels are
    /// inferred (in order of first appearance) at materialization.
    Factor { levels: Vec<String>, ordered: bool },
    /// Drop the column from the store entirely.
    Skip,
}

impl ColumnType {
    /// Short label used in problem reports.
    pub fn label(&self) -> &'static str {
        match self {
            ColumnType::Logical => "logical",
            ColumnType::Integer => "integer",
            ColumnType::Double => "double",
            ColumnType::Number => "number",
            ColumnType::Time => "time",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
            ColumnType::Character => "character",
            ColumnType::Factor { .. } => "factor",
            ColumnType::Skip => "skip",
        }
    }

    /// The Arrow type a materialized column of this type uses.
    pub fn arrow_type(&self) -> DataType {
        match self {
            ColumnType::Logical => DataType::Boolean,
            ColumnType::Integer => DataType::Int64,
            ColumnType::Double | ColumnType::Number => DataType::Float64,
            ColumnType::Time => DataType::Time32(TimeUnit::Second),
            ColumnType::Date => DataType::Date32,
            ColumnType::Datetime => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnType::Character | ColumnType::Skip => DataType::Utf8,
            ColumnType::Factor { .. } => DataType::Dictionary(
                Box::new(DataType::Int32),
                Box::new(DataType::Utf8),
            ),
        }
    }
}

/// Convert decoded cell content to a typed value. `format` carries the
/// temporal format chosen during inference (or supplied by the caller);
/// without one, the locale's format list is tried in order.
pub fn convert(
    bytes: &[u8],
    ty: &ColumnType,
    format: Option<&str>,
    locale: &Locale,
) -> Option<Value> {
    match ty {
        ColumnType::Character | ColumnType::Skip => {
            Some(Value::Str(String::from_utf8_lossy(bytes).into_owned()))
        }
        ColumnType::Factor { levels, .. } => {
            let s = String::from_utf8_lossy(bytes);
            if levels.is_empty() || levels.iter().any(|l| l == s.as_ref()) {
                Some(Value::Str(s.into_owned()))
            } else {
                None
            }
        }
        ColumnType::Logical => parse_logical(utf8(bytes)?).map(Value::Bool),
        ColumnType::Integer => parse_integer(utf8(bytes)?).map(Value::Int),
        ColumnType::Double => parse_double(utf8(bytes)?, locale).map(Value::Float),
        ColumnType::Number => parse_number(utf8(bytes)?, locale).map(Value::Float),
        ColumnType::Date => parse_date(utf8(bytes)?, format, &locale.date_formats).map(Value::Date),
        ColumnType::Time => parse_time(utf8(bytes)?, format, &locale.time_formats).map(Value::Time),
        ColumnType::Datetime => {
            parse_datetime(utf8(bytes)?, format, &locale.datetime_formats).map(Value::Datetime)
        }
    }
}

#[inline]
fn utf8(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

pub(crate) fn parse_logical(s: &str) -> Option<bool> {
    match s {
        "TRUE" | "True" | "true" | "T" => Some(true),
        "FALSE" | "False" | "false" | "F" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_integer(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    s.parse::<i64>().ok()
}

pub(crate) fn parse_double(s: &str, locale: &Locale) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    if locale.decimal_mark == '.' {
        return s.parse::<f64>().ok();
    }
    if s.contains('.') {
        // A dot cannot appear in a number under a non-dot decimal mark.
        return None;
    }
    s.replace(locale.decimal_mark, ".").parse::<f64>().ok()
}

/// Grouping-tolerant double: strips the grouping mark, currency glyphs,
/// and percent signs before parsing. Plain doubles also qualify, but
/// inference tries [`ColumnType::Double`] first so they never land here.
pub(crate) fn parse_number(s: &str, locale: &Locale) -> Option<f64> {
    let mut cleaned = String::with_capacity(s.len());
    for c in s.chars() {
        if c == locale.grouping_mark || matches!(c, '$' | '%' | '\u{a3}' | '\u{20ac}' | '\u{a5}') {
            continue;
        }
        if c == locale.decimal_mark {
            cleaned.push('.');
        } else {
            cleaned.push(c);
        }
    }
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

pub(crate) fn parse_date(s: &str, format: Option<&str>, formats: &[String]) -> Option<i32> {
    let parse = |fmt: &str| NaiveDate::parse_from_str(s, fmt).ok();
    let date = match format {
        Some(fmt) => parse(fmt)?,
        None => formats.iter().find_map(|fmt| parse(fmt))?,
    };
    Some(date.num_days_from_ce() - EPOCH_CE_DAYS)
}

pub(crate) fn parse_time(s: &str, format: Option<&str>, formats: &[String]) -> Option<i32> {
    let parse = |fmt: &str| NaiveTime::parse_from_str(s, fmt).ok();
    let time = match format {
        Some(fmt) => parse(fmt)?,
        None => formats.iter().find_map(|fmt| parse(fmt))?,
    };
    Some(time.num_seconds_from_midnight() as i32)
}

pub(crate) fn parse_datetime(s: &str, format: Option<&str>, formats: &[String]) -> Option<i64> {
    let parse = |fmt: &str| NaiveDateTime::parse_from_str(s, fmt).ok();
    let dt = match format {
        Some(fmt) => parse(fmt)?,
        None => formats.iter().find_map(|fmt| parse(fmt))?,
    };
    Some(dt.and_utc().timestamp_micros())
}
