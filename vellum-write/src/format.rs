//! Field formatting and quoting policy.

use vellum_result::{Error, Result};
use vellum_table::Value;

/// Output record terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
}

impl LineEnding {
    #[inline]
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// When fields get quoted on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotePolicy {
    /// Quote only fields containing the delimiter, the quote byte, or a
    /// line break.
    Needs,
    /// Quote every non-NA string field (and anything `Needs` would).
    Always,
    /// Never quote; a field that would need quoting fails the write.
    Never,
}

/// Configuration for the writer.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub delim: u8,
    pub quote: u8,
    pub quote_policy: QuotePolicy,
    pub include_header: bool,
    /// Rendering of NA cells. Never quoted.
    pub na: String,
    pub line_ending: LineEnding,
    /// Rows per formatting chunk.
    pub chunk_rows: usize,
    pub num_threads: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            delim: b',',
            quote: b'"',
            quote_policy: QuotePolicy::Needs,
            include_header: true,
            na: "NA".to_string(),
            line_ending: LineEnding::Lf,
            chunk_rows: 1 << 15,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Append one rendered field to `buf` under the quoting policy.
pub(crate) fn push_field(buf: &mut Vec<u8>, value: &Value, options: &WriteOptions) -> Result<()> {
    if value.is_null() {
        buf.extend_from_slice(options.na.as_bytes());
        return Ok(());
    }

    let rendered = value.to_string();
    let bytes = rendered.as_bytes();
    let needs = bytes.iter().any(|&b| {
        b == options.delim || b == options.quote || b == b'\r' || b == b'\n'
    });

    let quoted = match options.quote_policy {
        QuotePolicy::Needs => needs,
        QuotePolicy::Always => needs || matches!(value, Value::Str(_)),
        QuotePolicy::Never => {
            if needs {
                return Err(Error::InvalidArgumentError(format!(
                    "field '{rendered}' needs quoting but the quote policy is 'never'"
                )));
            }
            false
        }
    };

    if !quoted {
        buf.extend_from_slice(bytes);
        return Ok(());
    }

    buf.push(options.quote);
    for &b in bytes {
        if b == options.quote {
            buf.push(options.quote);
        }
        buf.push(b);
    }
    buf.push(options.quote);
    Ok(())
}

/// Format one chunk of rows into a private buffer.
pub(crate) fn format_chunk(rows: &[Vec<Value>], options: &WriteOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(rows.len() * 32);
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                buf.push(options.delim);
            }
            push_field(&mut buf, value, options)?;
        }
        buf.extend_from_slice(options.line_ending.as_bytes());
    }
    Ok(buf)
}

/// Format the header record.
pub(crate) fn format_header(names: &[String], options: &WriteOptions) -> Result<Vec<u8>> {
    let row: Vec<Value> = names.iter().map(|n| Value::Str(n.clone())).collect();
    format_chunk(std::slice::from_ref(&row), options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(value: Value, options: &WriteOptions) -> String {
        let mut buf = Vec::new();
        push_field(&mut buf, &value, options).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn quotes_only_when_needed_by_default() {
        let options = WriteOptions::default();
        assert_eq!(render(Value::Str("plain".into()), &options), "plain");
        assert_eq!(render(Value::Str("a,b".into()), &options), "\"a,b\"");
        assert_eq!(render(Value::Str("say \"hi\"".into()), &options), "\"say \"\"hi\"\"\"");
        assert_eq!(render(Value::Str("line\nbreak".into()), &options), "\"line\nbreak\"");
        assert_eq!(render(Value::Int(5), &options), "5");
        assert_eq!(render(Value::Null, &options), "NA");
    }

    #[test]
    fn always_quotes_strings_but_not_numbers() {
        let options = WriteOptions {
            quote_policy: QuotePolicy::Always,
            ..WriteOptions::default()
        };
        assert_eq!(render(Value::Str("x".into()), &options), "\"x\"");
        assert_eq!(render(Value::Int(5), &options), "5");
        assert_eq!(render(Value::Null, &options), "NA");
    }

    #[test]
    fn never_fails_on_ambiguous_fields() {
        let options = WriteOptions {
            quote_policy: QuotePolicy::Never,
            ..WriteOptions::default()
        };
        let mut buf = Vec::new();
        assert!(push_field(&mut buf, &Value::Str("a,b".into()), &options).is_err());
        assert!(push_field(&mut buf, &Value::Str("ok".into()), &options).is_ok());
    }

    #[test]
    fn formats_whole_rows() {
        let options = WriteOptions::default();
        let rows = vec![
            vec![Value::Int(1), Value::Str("a".into())],
            vec![Value::Null, Value::Str("b,c".into())],
        ];
        let buf = format_chunk(&rows, &options).unwrap();
        assert_eq!(buf, b"1,a\nNA,\"b,c\"\n");
    }

    #[test]
    fn crlf_line_endings() {
        let options = WriteOptions {
            line_ending: LineEnding::CrLf,
            ..WriteOptions::default()
        };
        let rows = vec![vec![Value::Int(1)]];
        assert_eq!(format_chunk(&rows, &options).unwrap(), b"1\r\n");
    }
}
