//! The delimiter-aware, quote-aware field indexer.
//!
//! One pass over the byte region records the start offset of every
//! field and the content end of every record. Nothing is decoded here;
//! the column store materializes cells later through [`Span`] lookups.
//!
//! Mmap-backed regions above [`PARALLEL_THRESHOLD`] are scanned by a
//! fixed pool of workers over contiguous chunks. Chunk boundaries are
//! arbitrated with quote parity: a cheap counting pass establishes each
//! chunk's starting parity, workers begin at the first record boundary
//! that parity proves is outside any quoted field, and the driver
//! validates that adjacent chunks agree before publishing. A boundary
//! that fails validation is re-scanned sequentially, bounding rework to
//! one chunk.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rayon::prelude::*;
use vellum_result::{Error, Result};
use vellum_source::ByteSource;

use crate::guess::guess_delimiter;
use crate::names;
use crate::progress::{ProgressCounters, ProgressSink};
use crate::{FieldDecode, FieldIndex, ShapeIssue, Span, decode_field};

/// Regions smaller than this are always scanned sequentially.
pub const PARALLEL_THRESHOLD: usize = 64 * 1024;

const BOM: &[u8] = &[0xef, 0xbb, 0xbf];
const CHECK_INTERVAL: u64 = 4096;

/// Record terminator convention, fixed by the first terminator seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newline {
    Lf,
    CrLf,
}

impl Newline {
    #[inline]
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Newline::Lf => b"\n",
            Newline::CrLf => b"\r\n",
        }
    }
}

/// Configuration for [`index_delimited`].
#[derive(Clone)]
pub struct IndexConfig {
    /// Field delimiter; guessed from a sample when absent.
    pub delim: Option<u8>,
    /// Quote byte; `None` disables quote handling entirely.
    pub quote: Option<u8>,
    /// Treat two consecutive quotes inside a quoted field as one literal.
    pub escape_double: bool,
    /// Treat `\x` as literal `x`.
    pub escape_backslash: bool,
    /// Trim ASCII whitespace around field content.
    pub trim_ws: bool,
    /// Lines whose first non-whitespace byte equals this are skipped.
    pub comment: Option<u8>,
    /// Physical lines to skip before anything else.
    pub skip: usize,
    /// Stop after this many data records.
    pub n_max: Option<u64>,
    /// Whether the first record provides column names.
    pub has_header: bool,
    /// Worker count for the parallel scan.
    pub num_threads: usize,
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for IndexConfig {
    fn default() -> Self {
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
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            progress: None,
            cancel: None,
        }
    }
}

impl IndexConfig {
    fn decode_spec(&self) -> FieldDecode {
        FieldDecode {
            quote: self.quote,
            trim_ws: self.trim_ws,
            escape_double: self.escape_double,
            escape_backslash: self.escape_backslash,
        }
    }
}

/// The published index over one delimited byte region.
///
/// `offsets` holds the start of every field in row-major order plus a
/// trailing sentinel; `rec_ends` holds the content end of each record's
/// last kept field. Spans are derived, never stored.
#[derive(Debug)]
pub struct DelimitedIndex {
    offsets: Vec<u64>,
    rec_ends: Vec<u64>,
    ncols: usize,
    nrows: u64,
    names: Vec<String>,
    header: Option<Span>,
    delim: u8,
    newline: Newline,
    decode: FieldDecode,
    any_escaped: bool,
    issues: Vec<ShapeIssue>,
}

impl DelimitedIndex {
    /// The delimiter the file was indexed with (guessed or configured).
    pub fn delim(&self) -> u8 {
        self.delim
    }

    /// The record terminator convention of the file.
    pub fn newline(&self) -> Newline {
        self.newline
    }

    /// Byte range of the header record, when one was present.
    pub fn header(&self) -> Option<Span> {
        self.header
    }

    /// Raw field-start offsets (row-major, with trailing sentinel).
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl FieldIndex for DelimitedIndex {
    fn row_count(&self) -> u64 {
        self.nrows
    }

    fn column_count(&self) -> usize {
        self.ncols
    }

    fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    fn span(&self, row: u64, col: usize) -> Option<Span> {
        debug_assert!(row < self.nrows && col < self.ncols);
        let i = row as usize * self.ncols + col;
        let lo = self.offsets[i];
        let rec_end = self.rec_ends[row as usize];
        if lo > rec_end {
            // NA padding of a short record.
            return None;
        }
        let hi = if col + 1 == self.ncols {
            rec_end
        } else {
            (self.offsets[i + 1] - 1).min(rec_end)
        };
        Some(Span { lo, hi })
    }

    fn decode_spec(&self) -> &FieldDecode {
        &self.decode
    }

    fn needs_unescape(&self) -> bool {
        self.any_escaped
    }

    fn shape_issues(&self) -> &[ShapeIssue] {
        &self.issues
    }
}

/// Build a [`DelimitedIndex`] over `source`.
pub fn index_delimited(source: &Arc<ByteSource>, config: &IndexConfig) -> Result<DelimitedIndex> {
    let data = source.as_bytes();
    source.advise_sequential();

    let mut pos = if data.starts_with(BOM) { BOM.len() } else { 0 };
    pos = skip_physical_lines(data, pos, config.skip, config.quote);

    let delim = match config.delim {
        Some(d) => d,
        None => guess_delimiter(&data[pos..], config.quote)?,
    };
    if Some(delim) == config.quote {
        return Err(Error::InvalidArgumentError(
            "delimiter and quote byte must differ".into(),
        ));
    }

    let scan = ScanConfig {
        delim,
        quote: config.quote,
        escape_double: config.escape_double,
        escape_backslash: config.escape_backslash,
        trim_ws: config.trim_ws,
        comment: config.comment,
    };
    let decode = config.decode_spec();

    // Header record, if any. Leading comment and blank lines are
    // skipped by the scanner itself.
    let mut header = None;
    let mut names = Vec::new();
    let mut ncols: Option<usize> = None;
    if config.has_header {
        let mut out = ChunkOut::new(pos);
        let mut learned = None;
        scan_records(
            data,
            pos,
            data.len(),
            &scan,
            &mut learned,
            Some(1),
            None,
            None,
            &mut out,
        )?;
        if out.rows == 1 {
            header = Some(Span {
                lo: out.offsets[0],
                hi: out.rec_ends[0],
            });
            names = header_names(data, &out, &decode);
            ncols = Some(names.len());
            pos = out.stop;
        }
    }

    let counters = ProgressCounters::default();
    let total = data.len() as u64;
    if let Some(sink) = &config.progress {
        sink.report(counters.snapshot(total));
    }

    let cancel = config.cancel.as_deref();
    let cap = config.n_max;
    let remaining = data.len().saturating_sub(pos);
    let threads = config.num_threads.max(1);

    let parallel = source.is_mmap()
        && remaining > PARALLEL_THRESHOLD
        && threads > 1
        && !config.escape_backslash
        && cap != Some(0);

    let chunks = if cap == Some(0) {
        Vec::new()
    } else if parallel {
        scan_parallel(
            data,
            pos,
            &scan,
            &mut ncols,
            threads,
            cap,
            cancel,
            &counters,
            config.progress.as_deref(),
            total,
        )?
    } else {
        let mut out = ChunkOut::new(pos);
        scan_records(data, pos, data.len(), &scan, &mut ncols, cap, None, cancel, &mut out)?;
        counters.add(out.stop.saturating_sub(pos) as u64, out.rows);
        vec![out]
    };

    let ncols = ncols.unwrap_or(names.len());
    if names.is_empty() && ncols > 0 {
        names = names::generated(ncols);
    }

    // Assemble the chunk outputs in order, truncating at the row cap.
    let mut budget = cap.unwrap_or(u64::MAX);
    let mut offsets = Vec::new();
    let mut rec_ends = Vec::new();
    let mut issues = Vec::new();
    let mut newline = None;
    let mut any_escaped = false;
    for chunk in &chunks {
        let take = chunk.rows.min(budget) as usize;
        budget -= take as u64;
        let base = rec_ends.len() as u64;
        offsets.extend_from_slice(&chunk.offsets[..take * ncols]);
        rec_ends.extend_from_slice(&chunk.rec_ends[..take]);
        issues.extend(
            chunk
                .issues
                .iter()
                .take_while(|issue| (issue.row as usize) < take)
                .map(|issue| ShapeIssue {
                    row: base + issue.row,
                    ..*issue
                }),
        );
        any_escaped |= chunk.any_escaped;
        if newline.is_none() {
            newline = chunk.newline;
        }
        if budget == 0 {
            break;
        }
    }
    let nrows = rec_ends.len() as u64;
    let sentinel = offsets.last().copied().unwrap_or(0).max(data.len() as u64);
    offsets.push(sentinel);

    if let Some(sink) = &config.progress {
        sink.report(counters.snapshot(total));
    }
    tracing::debug!(rows = nrows, cols = ncols, delim = %(delim as char), "published index");

    Ok(DelimitedIndex {
        offsets,
        rec_ends,
        ncols,
        nrows,
        names,
        header,
        delim,
        newline: newline.unwrap_or(Newline::Lf),
        decode,
        any_escaped,
        issues,
    })
}

#[derive(Clone, Copy)]
struct ScanConfig {
    delim: u8,
    quote: Option<u8>,
    escape_double: bool,
    escape_backslash: bool,
    trim_ws: bool,
    comment: Option<u8>,
}

/// Offsets produced by one scan over one contiguous stretch of records.
struct ChunkOut {
    offsets: Vec<u64>,
    rec_ends: Vec<u64>,
    issues: Vec<ShapeIssue>,
    rows: u64,
    any_escaped: bool,
    newline: Option<Newline>,
    start: usize,
    stop: usize,
}

impl ChunkOut {
    fn new(start: usize) -> Self {
        Self {
            offsets: Vec::new(),
            rec_ends: Vec::new(),
            issues: Vec::new(),
            rows: 0,
            any_escaped: false,
            newline: None,
            start,
            stop: start,
        }
    }
}

/// Shared row accounting for the `n_max` cap across scan workers.
struct RowBudget {
    counts: Vec<AtomicU64>,
    cap: u64,
}

impl RowBudget {
    /// Rows produced so far by workers up to and including `worker`.
    /// Once this reaches the cap, nothing this worker emits next can
    /// survive the driver's truncation.
    fn upstream(&self, worker: usize) -> u64 {
        self.counts[..=worker]
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }
}

/// How one field's scan ended.
enum FieldEnd {
    /// A delimiter; the record continues.
    Delim,
    /// A record terminator (or EOF); `end` is the content end.
    Record { end: usize, crlf: bool },
}

fn header_names(data: &[u8], out: &ChunkOut, decode: &FieldDecode) -> Vec<String> {
    let ncols = out.offsets.len();
    let rec_end = out.rec_ends[0] as usize;
    let mut raw = Vec::with_capacity(ncols);
    for col in 0..ncols {
        let lo = out.offsets[col] as usize;
        let hi = if col + 1 == ncols {
            rec_end
        } else {
            ((out.offsets[col + 1] - 1) as usize).min(rec_end)
        };
        let bytes = decode_field(&data[lo..hi], decode);
        raw.push(String::from_utf8_lossy(&bytes).into_owned());
    }
    names::dedup(raw)
}

/// Skip `n` physical lines, respecting quotes.
fn skip_physical_lines(data: &[u8], mut pos: usize, n: usize, quote: Option<u8>) -> usize {
    for _ in 0..n {
        let mut in_quote = false;
        loop {
            let rest = &data[pos..];
            let hit = match quote {
                Some(q) if in_quote => memchr::memchr(q, rest),
                Some(q) => memchr::memchr2(q, b'\n', rest),
                None => memchr::memchr(b'\n', rest),
            };
            let Some(k) = hit else {
                return data.len();
            };
            let b = rest[k];
            pos += k + 1;
            if Some(b) == quote {
                in_quote = !in_quote;
            } else if !in_quote {
                break;
            }
        }
    }
    pos
}

/// Scan records from `from` until the first record boundary at or past
/// `hard_end`, appending results to `out`.
///
/// `ncols`: `None` lets the first record fix the schema width; the
/// chosen width is written back. `local_cap` bounds the records this
/// call emits. `budget` is the shared cross-worker cap accounting,
/// paired with this worker's position in chunk order.
#[allow(clippy::too_many_arguments)]
fn scan_records(
    data: &[u8],
    from: usize,
    hard_end: usize,
    cfg: &ScanConfig,
    ncols: &mut Option<usize>,
    local_cap: Option<u64>,
    budget: Option<(&RowBudget, usize)>,
    cancel: Option<&AtomicBool>,
    out: &mut ChunkOut,
) -> Result<()> {
    let mut pos = from;
    let mut fields: Vec<u64> = Vec::new();
    out.start = from;
    out.stop = from;

    loop {
        out.stop = pos;
        if pos >= hard_end || pos >= data.len() {
            break;
        }

        if out.rows % CHECK_INTERVAL == 0 {
            if let Some(c) = cancel
                && c.load(Ordering::Relaxed)
            {
                return Err(Error::Cancelled);
            }
            if let Some((budget, worker)) = budget
                && budget.upstream(worker) >= budget.cap
            {
                break;
            }
        }
        if let Some(cap) = local_cap
            && out.rows >= cap
        {
            break;
        }

        // Blank and comment lines are skipped, not emitted.
        let mut probe = pos;
        while probe < data.len() && is_ws(data[probe], cfg.delim) {
            probe += 1;
        }
        match data.get(probe) {
            None => {
                pos = data.len();
                continue;
            }
            Some(&b'\n') => {
                pos = probe + 1;
                continue;
            }
            Some(&b'\r') if data.get(probe + 1) == Some(&b'\n') => {
                pos = probe + 2;
                continue;
            }
            Some(&b) if Some(b) == cfg.comment => {
                pos = match memchr::memchr(b'\n', &data[probe..]) {
                    Some(k) => probe + k + 1,
                    None => data.len(),
                };
                continue;
            }
            _ => {}
        }

        // One record.
        fields.clear();
        let record_end;
        let terminator_crlf;
        loop {
            fields.push(pos as u64);
            match scan_one_field(data, &mut pos, cfg, &mut out.any_escaped)? {
                FieldEnd::Delim => {}
                FieldEnd::Record { end, crlf } => {
                    record_end = end;
                    terminator_crlf = crlf;
                    break;
                }
            }
        }

        finalize_record(&fields, record_end, ncols, out);
        if out.newline.is_none() {
            out.newline = Some(if terminator_crlf {
                Newline::CrLf
            } else {
                Newline::Lf
            });
        }
        if let Some((budget, worker)) = budget {
            budget.counts[worker].fetch_add(1, Ordering::Relaxed);
        }
        out.stop = pos;
        if pos >= hard_end {
            break;
        }
    }
    Ok(())
}

/// Scan one field starting at `*pos`, leaving `*pos` one past the
/// delimiter or terminator that ended it.
fn scan_one_field(
    data: &[u8],
    pos: &mut usize,
    cfg: &ScanConfig,
    any_escaped: &mut bool,
) -> Result<FieldEnd> {
    let field_start = *pos;

    let mut content = field_start;
    if cfg.trim_ws {
        while content < data.len() && is_ws(data[content], cfg.delim) {
            content += 1;
        }
    }

    if let Some(q) = cfg.quote
        && data.get(content) == Some(&q)
    {
        // Quoted mode: the field runs to the next unescaped quote.
        let opened_at = content;
        let mut at = content + 1;
        loop {
            let rest = &data[at..];
            let hit = if cfg.escape_backslash {
                memchr::memchr2(q, b'\\', rest)
            } else {
                memchr::memchr(q, rest)
            };
            let Some(k) = hit else {
                return Err(Error::UnterminatedQuote {
                    offset: opened_at as u64,
                });
            };
            let found = at + k;
            if data[found] == b'\\' {
                *any_escaped = true;
                at = (found + 2).min(data.len());
                continue;
            }
            if cfg.escape_double && data.get(found + 1) == Some(&q) {
                *any_escaped = true;
                at = found + 2;
                continue;
            }
            at = found + 1;
            break;
        }
        // After the closing quote: a delimiter, a record terminator, or
        // (with trim_ws) whitespace.
        loop {
            match data.get(at) {
                None => {
                    *pos = data.len();
                    return Ok(FieldEnd::Record {
                        end: data.len(),
                        crlf: false,
                    });
                }
                Some(&b) if b == cfg.delim => {
                    *pos = at + 1;
                    return Ok(FieldEnd::Delim);
                }
                Some(&b'\n') => {
                    *pos = at + 1;
                    return Ok(FieldEnd::Record {
                        end: at,
                        crlf: false,
                    });
                }
                Some(&b'\r') if data.get(at + 1) == Some(&b'\n') => {
                    *pos = at + 2;
                    return Ok(FieldEnd::Record {
                        end: at,
                        crlf: true,
                    });
                }
                Some(&b) if cfg.trim_ws && is_ws(b, cfg.delim) => {
                    at += 1;
                }
                Some(_) => {
                    return Err(Error::MalformedQuote { offset: at as u64 });
                }
            }
        }
    }

    // Unquoted mode: run to the next delimiter or newline.
    let rest = &data[field_start..];
    match memchr::memchr2(cfg.delim, b'\n', rest) {
        None => {
            *pos = data.len();
            Ok(FieldEnd::Record {
                end: data.len(),
                crlf: false,
            })
        }
        Some(k) if rest[k] == cfg.delim => {
            *pos = field_start + k + 1;
            Ok(FieldEnd::Delim)
        }
        Some(k) => {
            let nl = field_start + k;
            *pos = nl + 1;
            if nl > field_start && data[nl - 1] == b'\r' {
                Ok(FieldEnd::Record {
                    end: nl - 1,
                    crlf: true,
                })
            } else {
                Ok(FieldEnd::Record {
                    end: nl,
                    crlf: false,
                })
            }
        }
    }
}

#[inline]
fn is_ws(b: u8, delim: u8) -> bool {
    (b == b' ' || b == b'\t') && b != delim
}

/// Apply the column-count policy and append one record to `out`.
fn finalize_record(fields: &[u64], record_end: usize, ncols: &mut Option<usize>, out: &mut ChunkOut) {
    let found = fields.len();
    let expected = *ncols.get_or_insert(found);

    let row = out.rows;
    if found < expected {
        out.offsets.extend_from_slice(fields);
        // Padded fields sit one past the record's content end, which
        // the span lookup reads back as the NA sentinel.
        let pad = record_end as u64 + 1;
        out.offsets.extend(std::iter::repeat_n(pad, expected - found));
        out.rec_ends.push(record_end as u64);
        out.issues.push(ShapeIssue {
            row,
            expected,
            found,
        });
    } else if found > expected {
        out.offsets.extend_from_slice(&fields[..expected]);
        // Kept content ends before the delimiter that introduced the
        // first surplus field.
        out.rec_ends.push(fields[expected] - 1);
        out.issues.push(ShapeIssue {
            row,
            expected,
            found,
        });
    } else {
        out.offsets.extend_from_slice(fields);
        out.rec_ends.push(record_end as u64);
    }
    out.rows += 1;
}

/// Parallel scan: parity pass, chunked state-machine pass, boundary
/// validation with sequential repair.
#[allow(clippy::too_many_arguments)]
fn scan_parallel(
    data: &[u8],
    from: usize,
    cfg: &ScanConfig,
    ncols: &mut Option<usize>,
    threads: usize,
    cap: Option<u64>,
    cancel: Option<&AtomicBool>,
    counters: &ProgressCounters,
    sink: Option<&dyn ProgressSink>,
    bytes_total: u64,
) -> Result<Vec<ChunkOut>> {
    // Workers need a fixed schema width; learn it from the first record.
    if ncols.is_none() {
        let mut probe = ChunkOut::new(from);
        scan_records(data, from, data.len(), cfg, ncols, Some(1), None, None, &mut probe)?;
    }
    let Some(width) = *ncols else {
        return Ok(Vec::new());
    };

    let span = data.len() - from;
    let nchunks = threads.min(span / (PARALLEL_THRESHOLD / 2)).max(1);
    let chunk_len = span.div_ceil(nchunks);
    let bounds: Vec<usize> = (0..=nchunks)
        .map(|i| (from + i * chunk_len).min(data.len()))
        .collect();

    // Pass 1: quote parity at each nominal chunk boundary.
    let start_parity: Vec<bool> = match cfg.quote {
        Some(q) => {
            let ranges: Vec<(usize, usize)> =
                bounds.windows(2).map(|w| (w[0], w[1])).collect();
            let counts: Vec<usize> = ranges
                .into_par_iter()
                .map(|(lo, hi)| memchr::memchr_iter(q, &data[lo..hi]).count())
                .collect();
            let mut parity = Vec::with_capacity(nchunks);
            let mut acc = false;
            for c in &counts {
                parity.push(acc);
                acc ^= c % 2 == 1;
            }
            parity
        }
        None => vec![false; nchunks],
    };

    let budget = cap.map(|cap| RowBudget {
        counts: (0..nchunks).map(|_| AtomicU64::new(0)).collect(),
        cap,
    });

    // Pass 2: each worker scans from its safe start to the first record
    // boundary past its chunk end.
    let mut chunks: Vec<ChunkOut> = (0..nchunks)
        .into_par_iter()
        .map(|i| {
            let hard_end = bounds[i + 1];
            let start = if i == 0 {
                Some(from)
            } else {
                safe_start(data, bounds[i], start_parity[i], cfg.quote)
            };
            let mut out = ChunkOut::new(start.unwrap_or(data.len()));
            if let Some(start) = start
                && start < hard_end
            {
                let mut w = Some(width);
                scan_records(
                    data,
                    start,
                    hard_end,
                    cfg,
                    &mut w,
                    None,
                    budget.as_ref().map(|b| (b, i)),
                    cancel,
                    &mut out,
                )?;
            }
            counters.add(out.stop.saturating_sub(out.start) as u64, out.rows);
            if let Some(sink) = sink {
                sink.report(counters.snapshot(bytes_total));
            }
            Ok(out)
        })
        .collect::<Result<Vec<_>>>()?;

    // Validation: each worker must have stopped exactly where its
    // successor started. A conflict means the parity heuristic misfired
    // (stray quotes in unquoted fields); re-scan that chunk sequentially
    // from the proven boundary.
    for i in 1..chunks.len() {
        let prev_stop = chunks[i - 1].stop;
        if chunks[i].start != prev_stop {
            tracing::debug!(
                chunk = i,
                expected = prev_stop,
                observed = chunks[i].start,
                "quote parity arbitration retry"
            );
            let hard_end = bounds[i + 1].max(prev_stop);
            let mut out = ChunkOut::new(prev_stop);
            if prev_stop < data.len() {
                let mut w = Some(width);
                scan_records(data, prev_stop, hard_end, cfg, &mut w, None, None, cancel, &mut out)?;
            }
            chunks[i] = out;
        }
    }

    Ok(chunks)
}

/// First record boundary at or after `pos` that quote parity proves is
/// outside any quoted field. `parity` is the quote parity at `pos`.
fn safe_start(data: &[u8], pos: usize, parity: bool, quote: Option<u8>) -> Option<usize> {
    let Some(q) = quote else {
        return memchr::memchr(b'\n', &data[pos..]).map(|k| pos + k + 1);
    };
    let mut in_quote = parity;
    let mut at = pos;
    loop {
        let rest = &data[at..];
        if in_quote {
            let k = memchr::memchr(q, rest)?;
            in_quote = false;
            at += k + 1;
        } else {
            let k = memchr::memchr2(q, b'\n', rest)?;
            if rest[k] == b'\n' {
                return Some(at + k + 1);
            }
            in_quote = true;
            at += k + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(bytes: &[u8]) -> Arc<ByteSource> {
        Arc::new(ByteSource::from_vec(bytes.to_vec()))
    }

    fn cfg() -> IndexConfig {
        IndexConfig {
            delim: Some(b','),
            ..IndexConfig::default()
        }
    }

    fn field<'a>(data: &'a [u8], idx: &DelimitedIndex, row: u64, col: usize) -> Option<&'a [u8]> {
        idx.span(row, col)
            .map(|s| &data[s.lo as usize..s.hi as usize])
    }

    #[test]
    fn indexes_a_plain_file() {
        let data = b"a,b,c\n1,2,3\n4,5,6\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(idx.column_count(), 3);
        assert_eq!(idx.names(), &["a", "b", "c"]);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"1");
        assert_eq!(field(data, &idx, 0, 2).unwrap(), b"3");
        assert_eq!(field(data, &idx, 1, 1).unwrap(), b"5");
    }

    #[test]
    fn guesses_the_delimiter() {
        let data = b"a\tb\n1\t2\n";
        let idx = index_delimited(
            &source(data),
            &IndexConfig {
                delim: None,
                ..IndexConfig::default()
            },
        )
        .unwrap();
        assert_eq!(idx.delim(), b'\t');
        assert_eq!(idx.row_count(), 1);
    }

    #[test]
    fn quoted_fields_keep_embedded_newlines_and_delims() {
        let data = b"x,y\n\"a\nb\",1\nc,2\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"\"a\nb\"");
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"1");
        assert_eq!(field(data, &idx, 1, 0).unwrap(), b"c");
    }

    #[test]
    fn crlf_terminators_are_excluded_from_content() {
        let data = b"a,b\r\n1,22\r\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.newline(), Newline::CrLf);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"1");
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"22");
    }

    #[test]
    fn quoted_crlf_stays_inside_the_field() {
        let data = b"a,b\n\"x\r\ny\",1\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 1);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"\"x\r\ny\"");
    }

    #[test]
    fn short_records_pad_with_na() {
        let data = b"a,b,c\n1,2\n4,5,6\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"2");
        assert_eq!(idx.span(0, 2), None);
        assert_eq!(
            idx.shape_issues(),
            &[ShapeIssue {
                row: 0,
                expected: 3,
                found: 2
            }]
        );
        assert_eq!(field(data, &idx, 1, 2).unwrap(), b"6");
    }

    #[test]
    fn empty_trailing_field_is_not_na() {
        let data = b"a,b\n1,\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        let span = idx.span(0, 1).unwrap();
        assert!(span.is_empty());
    }

    #[test]
    fn wide_records_truncate() {
        let data = b"a,b\n1,2,3\n4,5\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 0, 1).unwrap(), b"2");
        assert_eq!(field(data, &idx, 1, 1).unwrap(), b"5");
        assert_eq!(
            idx.shape_issues(),
            &[ShapeIssue {
                row: 0,
                expected: 2,
                found: 3
            }]
        );
    }

    #[test]
    fn missing_final_newline_keeps_the_last_field() {
        let data = b"a,b\n1,2\n3,4";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 1, 1).unwrap(), b"4");
    }

    #[test]
    fn bom_is_consumed() {
        let data = b"\xef\xbb\xbfa,b\n1,2\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(idx.names(), &["a", "b"]);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"1");
    }

    #[test]
    fn comment_and_blank_lines_are_skipped() {
        let data = b"# note\na,b\n# mid\n1,2\n\n   \n3,4\n";
        let idx = index_delimited(
            &source(data),
            &IndexConfig {
                delim: Some(b','),
                comment: Some(b'#'),
                ..IndexConfig::default()
            },
        )
        .unwrap();
        assert_eq!(idx.names(), &["a", "b"]);
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 1, 0).unwrap(), b"3");
    }

    #[test]
    fn skip_lines_are_honored() {
        let data = b"junk line\na,b\n1,2\n";
        let idx = index_delimited(
            &source(data),
            &IndexConfig {
                delim: Some(b','),
                skip: 1,
                ..IndexConfig::default()
            },
        )
        .unwrap();
        assert_eq!(idx.names(), &["a", "b"]);
        assert_eq!(idx.row_count(), 1);
    }

    #[test]
    fn headerless_files_get_generated_names() {
        let data = b"1,2\n3,4\n";
        let idx = index_delimited(
            &source(data),
            &IndexConfig {
                delim: Some(b','),
                has_header: false,
                ..IndexConfig::default()
            },
        )
        .unwrap();
        assert_eq!(idx.names(), &["X1", "X2"]);
        assert_eq!(idx.row_count(), 2);
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"1");
    }

    #[test]
    fn n_max_caps_rows() {
        let data = b"a\n1\n2\n3\n";
        let capped = |n| {
            index_delimited(
                &source(data),
                &IndexConfig {
                    delim: Some(b','),
                    n_max: Some(n),
                    ..IndexConfig::default()
                },
            )
            .unwrap()
        };
        assert_eq!(capped(0).row_count(), 0);
        assert_eq!(capped(0).column_count(), 1);
        assert_eq!(capped(2).row_count(), 2);
        assert_eq!(capped(3).row_count(), 3);
        assert_eq!(capped(99).row_count(), 3);
    }

    #[test]
    fn empty_and_header_only_files() {
        let empty = index_delimited(&source(b""), &cfg()).unwrap();
        assert_eq!(empty.row_count(), 0);
        assert_eq!(empty.column_count(), 0);

        let header_only = index_delimited(&source(b"a,b\n"), &cfg()).unwrap();
        assert_eq!(header_only.row_count(), 0);
        assert_eq!(header_only.column_count(), 2);
        assert_eq!(header_only.names(), &["a", "b"]);
    }

    #[test]
    fn unterminated_quote_is_fatal() {
        let data = b"a,b\n\"oops,2\n";
        let err = index_delimited(&source(data), &cfg()).unwrap_err();
        assert!(matches!(err, Error::UnterminatedQuote { offset: 4 }));
    }

    #[test]
    fn junk_after_closing_quote_is_fatal() {
        let data = b"a,b\n\"x\"y,2\n";
        let err = index_delimited(&source(data), &cfg()).unwrap_err();
        assert!(matches!(err, Error::MalformedQuote { .. }));
    }

    #[test]
    fn doubled_quotes_set_the_escape_bit() {
        let data = b"a\n\"x\"\"y\"\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        assert!(idx.needs_unescape());
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"\"x\"\"y\"");
    }

    #[test]
    fn backslash_escapes_cover_quotes() {
        let data = b"a\n\"x\\\"y\"\n";
        let idx = index_delimited(
            &source(data),
            &IndexConfig {
                delim: Some(b','),
                escape_backslash: true,
                escape_double: false,
                ..IndexConfig::default()
            },
        )
        .unwrap();
        assert!(idx.needs_unescape());
        assert_eq!(field(data, &idx, 0, 0).unwrap(), b"\"x\\\"y\"");
    }

    #[test]
    fn reindexing_is_deterministic() {
        let data = b"a,b\n\"1,1\",2\n3,4\n";
        let first = index_delimited(&source(data), &cfg()).unwrap();
        let second = index_delimited(&source(data), &cfg()).unwrap();
        assert_eq!(first.offsets(), second.offsets());
        assert_eq!(first.row_count(), second.row_count());
    }

    #[test]
    fn offsets_are_non_decreasing() {
        let data = b"a,b,c\n1,2\n\"x\",\"y\",\"z\"\n";
        let idx = index_delimited(&source(data), &cfg()).unwrap();
        let offsets = idx.offsets();
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn large_input_matches_sequential_output() {
        // Large enough to cross the parallel threshold when mmapped; as
        // an owned region it exercises the sequential path against the
        // same expectations.
        let mut data = Vec::new();
        data.extend_from_slice(b"id,name,note\n");
        for i in 0..20_000 {
            data.extend_from_slice(
                format!("{i},\"name {i}\",\"line\nbreak {i}\"\n").as_bytes(),
            );
        }
        let idx = index_delimited(&source(&data), &cfg()).unwrap();
        assert_eq!(idx.row_count(), 20_000);
        assert_eq!(idx.column_count(), 3);
        let s = idx.span(19_999, 0).unwrap();
        assert_eq!(&data[s.lo as usize..s.hi as usize], b"19999");
    }
}
