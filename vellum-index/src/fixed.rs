//! Positional indexing of fixed-width files.
//!
//! Every configuration shape reduces to a vector of `(start, end)`
//! byte positions per column; indexing is then a newline scan with no
//! delimiter or quote handling at all.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use vellum_result::{Error, Result};
use vellum_source::ByteSource;

use crate::{FieldDecode, FieldIndex, ShapeIssue, Span, names};

/// One fixed-width column: half-open byte positions within a record.
/// `end == None` means the column runs to the end of the line.
#[derive(Debug, Clone)]
pub struct FwfColumn {
    pub name: String,
    pub start: usize,
    pub end: Option<usize>,
}

/// Column positions for a fixed-width file.
#[derive(Debug, Clone)]
pub struct FwfLayout {
    cols: Vec<FwfColumn>,
}

impl FwfLayout {
    pub fn columns(&self) -> &[FwfColumn] {
        &self.cols
    }

    /// Build from consecutive column widths.
    pub fn from_widths(widths: &[usize]) -> Result<Self> {
        let names = names::generated(widths.len());
        Self::from_named_widths(&names, widths)
    }

    /// Build from consecutive column widths with names.
    pub fn from_named_widths<S: AsRef<str>>(names: &[S], widths: &[usize]) -> Result<Self> {
        if names.len() != widths.len() {
            return Err(Error::InvalidArgumentError(format!(
                "{} names for {} widths",
                names.len(),
                widths.len()
            )));
        }
        let mut cols = Vec::with_capacity(widths.len());
        let mut start = 0;
        for (name, &width) in names.iter().zip(widths) {
            if width == 0 {
                return Err(Error::InvalidArgumentError(
                    "fixed-width columns must be at least one byte wide".into(),
                ));
            }
            cols.push(FwfColumn {
                name: name.as_ref().to_string(),
                start,
                end: Some(start + width),
            });
            start += width;
        }
        Ok(Self { cols })
    }

    /// Build from explicit inclusive `[start, end]` byte positions, the
    /// way column layouts are usually published. `end == None` leaves
    /// the final column open-ended.
    pub fn from_positions(starts: &[usize], ends: &[Option<usize>]) -> Result<Self> {
        let names = names::generated(starts.len());
        Self::from_named_positions(&names, starts, ends)
    }

    /// Named variant of [`FwfLayout::from_positions`].
    pub fn from_named_positions<S: AsRef<str>>(
        names: &[S],
        starts: &[usize],
        ends: &[Option<usize>],
    ) -> Result<Self> {
        if names.len() != starts.len() || starts.len() != ends.len() {
            return Err(Error::InvalidArgumentError(
                "column names, starts, and ends must have equal length".into(),
            ));
        }
        let mut cols = Vec::with_capacity(starts.len());
        for ((name, &start), &end) in names.iter().zip(starts).zip(ends) {
            let end_excl = match end {
                Some(e) if e < start => {
                    return Err(Error::InvalidArgumentError(format!(
                        "column '{}' ends ({e}) before it starts ({start})",
                        name.as_ref()
                    )));
                }
                Some(e) => Some(e + 1),
                None => None,
            };
            cols.push(FwfColumn {
                name: name.as_ref().to_string(),
                start,
                end: end_excl,
            });
        }
        Ok(Self { cols })
    }

    /// Infer column boundaries by finding byte columns that are blank
    /// in every one of the first `sample_lines` lines, placing breaks
    /// at the midpoints of the blank runs.
    pub fn infer(source: &ByteSource, sample_lines: usize) -> Result<Self> {
        let data = source.as_bytes();
        let mut widest = 0;
        let mut lines = Vec::new();
        for line in data.split(|&b| b == b'\n').take(sample_lines.max(1)) {
            let line = strip_cr(line);
            if line.is_empty() {
                continue;
            }
            widest = widest.max(line.len());
            lines.push(line);
        }
        if lines.is_empty() {
            return Err(Error::InvalidArgumentError(
                "cannot infer a fixed-width layout from an empty sample".into(),
            ));
        }

        // A byte column is blank when every sampled line is space there
        // (or has already ended).
        let blank: Vec<bool> = (0..widest)
            .map(|i| {
                lines
                    .iter()
                    .all(|line| line.get(i).is_none_or(|&b| b == b' '))
            })
            .collect();

        let mut breaks = vec![0usize];
        let mut run_start = None;
        for (i, &b) in blank.iter().enumerate() {
            match (b, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(s)) => {
                    // Midpoint of the blank run separates the columns.
                    // A run at position zero is a margin, not a break.
                    if s > 0 {
                        breaks.push(s + (i - s) / 2);
                    }
                    run_start = None;
                }
                _ => {}
            }
        }

        let mut cols = Vec::with_capacity(breaks.len());
        for (i, &start) in breaks.iter().enumerate() {
            let end = breaks.get(i + 1).copied();
            cols.push(FwfColumn {
                name: names::placeholder(i + 1),
                start,
                end,
            });
        }
        if cols.is_empty() {
            return Err(Error::InvalidArgumentError(
                "no fixed-width columns detected in the sample".into(),
            ));
        }
        Ok(Self { cols })
    }
}

/// Configuration for [`index_fixed_width`].
#[derive(Clone)]
pub struct FwfConfig {
    pub trim_ws: bool,
    pub comment: Option<u8>,
    pub skip: usize,
    pub n_max: Option<u64>,
    pub cancel: Option<Arc<std::sync::atomic::AtomicBool>>,
}

impl Default for FwfConfig {
    fn default() -> Self {
        Self {
            trim_ws: true,
            comment: None,
            skip: 0,
            n_max: None,
            cancel: None,
        }
    }
}

/// Index over a fixed-width byte region: one line per record, column
/// positions from the layout.
pub struct FwfIndex {
    line_starts: Vec<u64>,
    line_ends: Vec<u64>,
    layout: FwfLayout,
    names: Vec<String>,
    decode: FieldDecode,
    issues: Vec<ShapeIssue>,
}

impl FieldIndex for FwfIndex {
    fn row_count(&self) -> u64 {
        self.line_starts.len() as u64
    }

    fn column_count(&self) -> usize {
        self.layout.cols.len()
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    fn span(&self, row: u64, col: usize) -> Option<Span> {
        let start = self.line_starts[row as usize] as usize;
        let end = self.line_ends[row as usize] as usize;
        let len = end - start;
        let c = &self.layout.cols[col];
        if c.start >= len {
            // The record ends before this column begins.
            return None;
        }
        let hi = c.end.map_or(len, |e| e.min(len));
        Some(Span {
            lo: (start + c.start) as u64,
            hi: (start + hi) as u64,
        })
    }

    fn decode_spec(&self) -> &FieldDecode {
        &self.decode
    }

    fn shape_issues(&self) -> &[ShapeIssue] {
        &self.issues
    }
}

/// Build a [`FwfIndex`] over `source` using `layout`.
pub fn index_fixed_width(
    source: &Arc<ByteSource>,
    layout: &FwfLayout,
    config: &FwfConfig,
) -> Result<FwfIndex> {
    if layout.cols.is_empty() {
        return Err(Error::InvalidArgumentError(
            "fixed-width layout has no columns".into(),
        ));
    }
    let data = source.as_bytes();
    source.advise_sequential();

    let bom: &[u8] = &[0xef, 0xbb, 0xbf];
    let mut pos = if data.starts_with(bom) { bom.len() } else { 0 };

    let last_end = layout
        .cols
        .iter()
        .filter_map(|c| c.end)
        .max()
        .unwrap_or(usize::MAX);

    let mut line_starts = Vec::new();
    let mut line_ends = Vec::new();
    let mut issues = Vec::new();
    let mut skipped = 0usize;
    let cap = config.n_max.unwrap_or(u64::MAX);

    while pos < data.len() && (line_starts.len() as u64) < cap {
        if line_starts.len() % 4096 == 0
            && let Some(c) = &config.cancel
            && c.load(Ordering::Relaxed)
        {
            return Err(Error::Cancelled);
        }

        let nl = memchr::memchr(b'\n', &data[pos..]);
        let (line_end, next) = match nl {
            Some(k) => (pos + k, pos + k + 1),
            None => (data.len(), data.len()),
        };
        let content_end = if line_end > pos && data[line_end - 1] == b'\r' {
            line_end - 1
        } else {
            line_end
        };
        let line = &data[pos..content_end];

        if skipped < config.skip {
            skipped += 1;
            pos = next;
            continue;
        }
        let first = line.iter().position(|&b| b != b' ' && b != b'\t');
        match first {
            None => {
                // Blank line.
                pos = next;
                continue;
            }
            Some(i) if Some(line[i]) == config.comment => {
                pos = next;
                continue;
            }
            _ => {}
        }
        // A trailing partial line that cannot hold the first column is
        // ignored rather than emitted as an all-NA record.
        if nl.is_none() && line.len() <= layout.cols[0].start {
            break;
        }

        if line.len() < last_end {
            let found = layout
                .cols
                .iter()
                .filter(|c| c.start < line.len())
                .count();
            if found < layout.cols.len() {
                issues.push(ShapeIssue {
                    row: line_starts.len() as u64,
                    expected: layout.cols.len(),
                    found,
                });
            }
        }

        line_starts.push(pos as u64);
        line_ends.push(content_end as u64);
        pos = next;
    }

    let names = layout.cols.iter().map(|c| c.name.clone()).collect();
    Ok(FwfIndex {
        line_starts,
        line_ends,
        layout: layout.clone(),
        names,
        decode: FieldDecode {
            quote: None,
            trim_ws: config.trim_ws,
            escape_double: false,
            escape_backslash: false,
        },
        issues,
    })
}

#[inline]
fn strip_cr(line: &[u8]) -> &[u8] {
    match line {
        [rest @ .., b'\r'] => rest,
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(bytes: &[u8]) -> Arc<ByteSource> {
        Arc::new(ByteSource::from_vec(bytes.to_vec()))
    }

    fn field<'a>(data: &'a [u8], idx: &FwfIndex, row: u64, col: usize) -> Option<&'a [u8]> {
        idx.span(row, col)
            .map(|s| &data[s.lo as usize..s.hi as usize])
    }

    #[test]
    fn widths_layout_indexes_a_line() {
        let data = b"john      NYC       123-45-6789\n";
        let layout =
            FwfLayout::from_named_widths(&["name", "state", "ssn"], &[10, 10, 11]).unwrap();
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        assert_eq!(idx.row_count(), 1);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"john      ");
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"NYC       ");
        assert_eq!(field(data, &idx, 0, 2).unwrap(), b"123-45-6789");
    }

    #[test]
    fn positions_are_inclusive() {
        let data = b"abcdef\n";
        let layout = FwfLayout::from_positions(&[0, 3], &[Some(2), Some(5)]).unwrap();
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"abc");
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"def");
    }

    #[test]
    fn short_records_pad_with_na() {
        let data = b"abcdef\nabc\n";
        let layout = FwfLayout::from_widths(&[3, 3]).unwrap();
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 1, 0).unwrap(), b"abc");
        assert_eq!(idx.span(1, 1), None);
        assert_eq!(idx.shape_issues().len(), 1);
    }

    #[test]
    fn partially_covered_trailing_column_is_clamped() {
        let data = b"abcde\n";
        let layout = FwfLayout::from_widths(&[3, 3]).unwrap();
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"de");
    }

    #[test]
    fn open_ended_final_column_runs_to_line_end() {
        let data = b"ab rest of the line\n";
        let layout = FwfLayout::from_positions(&[0, 3], &[Some(1), None]).unwrap();
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"rest of the line");
    }

    #[test]
    fn infer_splits_on_blank_columns() {
        let data = b"john   NYC   123\nmary   SFO   456\n";
        let layout = FwfLayout::infer(&ByteSource::from_vec(data.to_vec()), 10).unwrap();
        assert_eq!(layout.columns().len(), 3);
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        let first = field(data, &idx, 0, 0).unwrap();
        assert!(first.starts_with(b"john"));
        let last = field(data, &idx, 1, 2).unwrap();
        assert!(last.ends_with(b"456"));
    }

    #[test]
    fn blank_comment_and_skipped_lines_are_dropped() {
        let data = b"junk\nab\n\n#no\ncd\n";
        let layout = FwfLayout::from_widths(&[2]).unwrap();
        let config = FwfConfig {
            skip: 1,
            comment: Some(b'#'),
            ..FwfConfig::default()
        };
        let idx = index_fixed_width(&source(data), &layout, &config).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"ab");
        assert_eq!(field(data, &idx, 1, 0).unwrap(), b"cd");
    }

    #[test]
    fn n_max_caps_rows() {
        let data = b"aa\nbb\ncc\n";
        let layout = FwfLayout::from_widths(&[2]).unwrap();
        let config = FwfConfig {
            n_max: Some(2),
            ..FwfConfig::default()
        };
        let idx = index_fixed_width(&source(data), &layout, &config).unwrap();
        assert_eq!(idx.row_count(), 2);
    }

    #[test]
    fn crlf_lines_exclude_the_carriage_return() {
        let data = b"ab\r\ncd\r\n";
        let layout = FwfLayout::from_widths(&[2]).unwrap();
        let idx = index_fixed_width(&source(data), &layout, &FwfConfig::default()).unwrap();
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"ab");
        assert_eq!(field(data, &idx, 1, 0).unwrap(), b"cd");
    }
}
