//! The scalar cell value.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike};

/// One decoded cell.
///
/// Temporal variants store the same primitive representations as their
/// materialized Arrow arrays: days since the epoch for dates, seconds
/// since midnight for times, and microseconds since the epoch (UTC) for
/// datetimes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The NA sentinel.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Date(i32),
    Time(i32),
    Datetime(i64),
    Str(String),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NA"),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Date(days) => match epoch_date(*days) {
                Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                None => f.write_str("NA"),
            },
            Value::Time(secs) => match NaiveTime::from_num_seconds_from_midnight_opt(
                (*secs).max(0) as u32,
                0,
            ) {
                Some(t) => write!(f, "{}", t.format("%H:%M:%S")),
                None => f.write_str("NA"),
            },
            Value::Datetime(micros) => match DateTime::from_timestamp_micros(*micros) {
                Some(dt) if dt.nanosecond() == 0 => {
                    write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ"))
                }
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.6fZ")),
                None => f.write_str("NA"),
            },
            Value::Str(s) => f.write_str(s),
        }
    }
}

pub(crate) fn epoch_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719_163)
}

pub(crate) const EPOCH_CE_DAYS: i32 = 719_163;
