//! Sampled type guessing.
//!
//! Up to `guess_max` records are sampled through the index (first,
//! last, and evenly spaced in between), so no unsampled row is ever
//! re-scanned. For each column the first type in the priority order
//! that accepts every sampled non-NA cell wins.

use vellum_index::MultiIndex;
use vellum_result::Result;

use crate::column::cell_bytes;
use crate::locale::Locale;
use crate::types::{
    ColumnType, parse_date, parse_datetime, parse_double, parse_integer, parse_logical,
    parse_number, parse_time,
};

/// Default number of sampled records.
pub const DEFAULT_GUESS_MAX: usize = 100;

/// The outcome of guessing one column: its type and, for temporal
/// types, the format that parsed every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeGuess {
    pub ty: ColumnType,
    pub format: Option<String>,
}

impl TypeGuess {
    fn plain(ty: ColumnType) -> Self {
        Self { ty, format: None }
    }
}

/// Guess a type for every column of `index`.
pub fn infer_types(
    index: &MultiIndex,
    na_strings: &[String],
    guess_max: usize,
    locale: &Locale,
) -> Result<Vec<TypeGuess>> {
    let nrows = index.row_count();
    let ncols = index.column_count();
    let rows = sample_rows(nrows, guess_max.max(1));

    let mut guesses = Vec::with_capacity(ncols);
    for col in 0..ncols {
        let mut samples: Vec<Vec<u8>> = Vec::with_capacity(rows.len());
        for &row in &rows {
            if let Some(bytes) = cell_bytes(index, row, col, na_strings)? {
                samples.push(bytes.into_owned());
            }
        }
        guesses.push(guess_column(&samples, locale));
    }
    Ok(guesses)
}

/// Sampled row numbers: everything when the file is small, otherwise
/// the first row, the last row, and evenly spaced rows in between.
fn sample_rows(nrows: u64, guess_max: usize) -> Vec<u64> {
    if nrows == 0 {
        return Vec::new();
    }
    let guess_max = guess_max as u64;
    if nrows <= guess_max {
        return (0..nrows).collect();
    }
    let mut rows: Vec<u64> = (0..guess_max)
        .map(|i| i * (nrows - 1) / (guess_max - 1))
        .collect();
    rows.dedup();
    rows
}

fn guess_column(samples: &[Vec<u8>], locale: &Locale) -> TypeGuess {
    if samples.is_empty() {
        // An all-NA column carries no evidence; read it as text.
        return TypeGuess::plain(ColumnType::Character);
    }

    let strings: Option<Vec<&str>> = samples
        .iter()
        .map(|b| std::str::from_utf8(b).ok())
        .collect();
    let Some(strings) = strings else {
        return TypeGuess::plain(ColumnType::Character);
    };

    if strings.iter().all(|s| parse_logical(s).is_some()) {
        return TypeGuess::plain(ColumnType::Logical);
    }
    if strings.iter().all(|s| parse_integer(s).is_some()) {
        return TypeGuess::plain(ColumnType::Integer);
    }
    if strings.iter().all(|s| parse_double(s, locale).is_some()) {
        return TypeGuess::plain(ColumnType::Double);
    }
    if strings.iter().all(|s| parse_number(s, locale).is_some()) {
        return TypeGuess::plain(ColumnType::Number);
    }
    if let Some(fmt) = winning_format(&strings, &locale.time_formats, |s, f| {
        parse_time(s, Some(f), &[]).is_some()
    }) {
        return TypeGuess {
            ty: ColumnType::Time,
            format: Some(fmt),
        };
    }
    if let Some(fmt) = winning_format(&strings, &locale.date_formats, |s, f| {
        parse_date(s, Some(f), &[]).is_some()
    }) {
        return TypeGuess {
            ty: ColumnType::Date,
            format: Some(fmt),
        };
    }
    if let Some(fmt) = winning_format(&strings, &locale.datetime_formats, |s, f| {
        parse_datetime(s, Some(f), &[]).is_some()
    }) {
        return TypeGuess {
            ty: ColumnType::Datetime,
            format: Some(fmt),
        };
    }
    TypeGuess::plain(ColumnType::Character)
}

/// The first format that parses every sample wins.
fn winning_format(
    samples: &[&str],
    formats: &[String],
    parses: impl Fn(&str, &str) -> bool,
) -> Option<String> {
    formats
        .iter()
        .find(|fmt| samples.iter().all(|s| parses(s, fmt)))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vellum_index::{IndexConfig, IndexedFile, index_delimited};
    use vellum_source::ByteSource;

    fn multi(data: &[u8]) -> MultiIndex {
        let source = Arc::new(ByteSource::from_vec(data.to_vec()));
        let config = IndexConfig {
            delim: Some(b','),
            ..IndexConfig::default()
        };
        let index = Arc::new(index_delimited(&source, &config).unwrap());
        MultiIndex::new(
            vec![IndexedFile {
                source,
                index,
                path: "test.csv".into(),
            }],
            true,
        )
        .unwrap()
    }

    fn na() -> Vec<String> {
        vec!["NA".into(), String::new()]
    }

    #[test]
    fn guesses_the_priority_ladder() {
        let index = multi(
            b"flag,count,ratio,amount,when,stamp,word\n\
              TRUE,1,0.5,\"1,200\",2024-01-01,2024-01-01T00:00:00,x\n\
              FALSE,2,1.5,\"3,400\",2024-06-15,2024-06-15T12:00:00,y\n",
        );
        let guesses = infer_types(&index, &na(), DEFAULT_GUESS_MAX, &Locale::default()).unwrap();
        let types: Vec<&ColumnType> = guesses.iter().map(|g| &g.ty).collect();
        assert_eq!(
            types,
            [
                &ColumnType::Logical,
                &ColumnType::Integer,
                &ColumnType::Double,
                &ColumnType::Number,
                &ColumnType::Date,
                &ColumnType::Datetime,
                &ColumnType::Character,
            ]
        );
        assert_eq!(guesses[4].format.as_deref(), Some("%Y-%m-%d"));
    }

    #[test]
    fn na_cells_do_not_block_a_guess() {
        let index = multi(b"v\n1\nNA\n3\n\n");
        let guesses = infer_types(&index, &na(), DEFAULT_GUESS_MAX, &Locale::default()).unwrap();
        assert_eq!(guesses[0].ty, ColumnType::Integer);
    }

    #[test]
    fn all_na_columns_read_as_text() {
        let index = multi(b"v\nNA\nNA\n");
        let guesses = infer_types(&index, &na(), DEFAULT_GUESS_MAX, &Locale::default()).unwrap();
        assert_eq!(guesses[0].ty, ColumnType::Character);
    }

    #[test]
    fn one_odd_cell_demotes_to_character() {
        let index = multi(b"v\n1\n2\nx\n");
        let guesses = infer_types(&index, &na(), DEFAULT_GUESS_MAX, &Locale::default()).unwrap();
        assert_eq!(guesses[0].ty, ColumnType::Character);
    }

    #[test]
    fn sampling_covers_first_and_last() {
        assert_eq!(sample_rows(3, 100), vec![0, 1, 2]);
        let sampled = sample_rows(1_000_000, 100);
        assert_eq!(*sampled.first().unwrap(), 0);
        assert_eq!(*sampled.last().unwrap(), 999_999);
        assert!(sampled.len() <= 100);
    }
}
