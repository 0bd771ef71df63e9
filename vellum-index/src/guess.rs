//! Delimiter autoguessing over a leading sample of the region.

use vellum_result::{Error, Result};

/// Candidate delimiters, in preference order.
pub const CANDIDATES: [u8; 5] = [b',', b'\t', b'|', b';', b':'];

const SAMPLE_BYTES: usize = 8 * 1024;
const SAMPLE_LINES: usize = 10;

/// Guess the delimiter from the first few kilobytes of `data`.
///
/// Bytes inside quoted regions are excluded from the counts. A
/// candidate qualifies when its per-line count is positive and constant
/// across at least two sampled non-empty lines; the qualifying
/// candidate with the highest per-line count wins, ties broken by
/// preference order.
pub fn guess_delimiter(data: &[u8], quote: Option<u8>) -> Result<u8> {
    let sample = &data[..data.len().min(SAMPLE_BYTES)];
    let lines = sample_lines(sample, quote);
    if lines.len() < 2 {
        return Err(Error::DelimiterUnknown);
    }

    let mut best: Option<(u8, usize)> = None;
    for &cand in &CANDIDATES {
        let counts: Vec<usize> = lines.iter().map(|line| count_outside_quotes(line, cand, quote)).collect();
        let first = counts[0];
        if first == 0 || counts.iter().any(|&c| c != first) {
            continue;
        }
        if best.is_none_or(|(_, n)| first > n) {
            best = Some((cand, first));
        }
    }

    match best {
        Some((delim, count)) => {
            tracing::debug!(delim = %(delim as char), per_line = count, "guessed delimiter");
            Ok(delim)
        }
        None => Err(Error::DelimiterUnknown),
    }
}

/// Split the sample into up to [`SAMPLE_LINES`] non-empty physical
/// lines, respecting quotes so an embedded newline does not end a line.
/// A trailing line cut off by the sample window is dropped.
fn sample_lines<'a>(sample: &'a [u8], quote: Option<u8>) -> Vec<&'a [u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut in_quote = false;
    for (i, &b) in sample.iter().enumerate() {
        if let Some(q) = quote
            && b == q
        {
            in_quote = !in_quote;
        } else if b == b'\n' && !in_quote {
            let mut line = &sample[start..i];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            if !line.iter().all(|&c| c == b' ' || c == b'\t') {
                lines.push(line);
                if lines.len() == SAMPLE_LINES {
                    return lines;
                }
            }
            start = i + 1;
        }
    }
    lines
}

fn count_outside_quotes(line: &[u8], needle: u8, quote: Option<u8>) -> usize {
    let mut n = 0;
    let mut in_quote = false;
    for &b in line {
        if let Some(q) = quote
            && b == q
        {
            in_quote = !in_quote;
        } else if b == needle && !in_quote {
            n += 1;
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_comma() {
        assert_eq!(guess_delimiter(b"a,b,c\n1,2,3\n4,5,6\n", Some(b'"')).unwrap(), b',');
    }

    #[test]
    fn guesses_tab_over_comma_when_counts_differ() {
        // Commas appear but not at a constant per-line count.
        let data = b"a\tb,c\td\n1\t2\t3\n";
        assert_eq!(guess_delimiter(data, Some(b'"')).unwrap(), b'\t');
    }

    #[test]
    fn quoted_delimiters_are_excluded() {
        let data = b"a;\"x,y\"\n1;\"2,3\"\n";
        assert_eq!(guess_delimiter(data, Some(b'"')).unwrap(), b';');
    }

    #[test]
    fn single_line_is_unknown() {
        assert!(matches!(
            guess_delimiter(b"a,b,c\n", Some(b'"')),
            Err(Error::DelimiterUnknown)
        ));
    }

    #[test]
    fn inconsistent_counts_are_unknown() {
        assert!(matches!(
            guess_delimiter(b"a^b\nc^^d\n", Some(b'"')),
            Err(Error::DelimiterUnknown)
        ));
    }
}
