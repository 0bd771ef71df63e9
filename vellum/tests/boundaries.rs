use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use vellum::{ByteSource, ColumnType, ReadOptions, Value, read_source};

fn mem(data: &[u8]) -> ByteSource {
    ByteSource::from_vec(data.to_vec())
}

#[test]
fn empty_file_is_zero_by_zero() {
    let table = read_source(mem(b""), &ReadOptions::default()).unwrap();
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.column_count(), 0);
    assert!(table.problems().is_empty());
}

#[test]
fn header_only_file_has_columns_but_no_rows() {
    let table = read_source(mem(b"a,b,c\n"), &ReadOptions::default()).unwrap();
    assert_eq!(table.row_count(), 0);
    assert_eq!(table.names(), ["a", "b", "c"]);
}

#[test]
fn single_row_without_trailing_newline() {
    let table = read_source(mem(b"a,b\n1,final"), &ReadOptions::default()).unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.get(1, 0).unwrap(), Value::Str("final".into()));
}

#[test]
fn crlf_inside_quoted_field() {
    let table = read_source(mem(b"a,b\n\"x\r\ny\",1\n"), &ReadOptions::default()).unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.get(0, 0).unwrap(), Value::Str("x\r\ny".into()));
}

#[test]
fn bom_is_ignored() {
    let table = read_source(mem(b"\xef\xbb\xbfa,b\n1,2\n"), &ReadOptions::default()).unwrap();
    assert_eq!(table.names(), ["a", "b"]);
    assert_eq!(table.get(0, 0).unwrap(), Value::Int(1));
}

#[test]
fn any_of_several_na_strings_matches() {
    let options = ReadOptions {
        na_strings: vec!["NA".into(), "n/a".into(), "".into()],
        ..ReadOptions::default()
    };
    let table = read_source(mem(b"v\n1\nn/a\nNA\n\"\"\n4\n"), &options).unwrap();
    assert_eq!(table.types()[0], &ColumnType::Integer);
    assert_eq!(table.get(0, 0).unwrap(), Value::Int(1));
    assert_eq!(table.get(0, 1).unwrap(), Value::Null);
    assert_eq!(table.get(0, 2).unwrap(), Value::Null);
    assert_eq!(table.get(0, 3).unwrap(), Value::Null);
    assert_eq!(table.get(0, 4).unwrap(), Value::Int(4));
}

#[test]
fn field_larger_than_four_mebibytes() {
    let big = "x".repeat(4 * 1024 * 1024 + 7);
    let mut data = Vec::new();
    data.extend_from_slice(b"a,b\n\"");
    data.extend_from_slice(big.as_bytes());
    data.extend_from_slice(b"\",1\n");

    let table = read_source(mem(&data), &ReadOptions::default()).unwrap();
    match table.get(0, 0).unwrap() {
        Value::Str(s) => assert_eq!(s.len(), big.len()),
        other => panic!("expected a string, got {other:?}"),
    }
}

#[test]
fn row_cap_of_zero_and_of_exact_count() {
    let data = b"a\n1\n2\n3\n";
    let capped = |n| {
        read_source(
            mem(data),
            &ReadOptions {
                n_max: Some(n),
                ..ReadOptions::default()
            },
        )
        .unwrap()
    };
    let zero = capped(0);
    assert_eq!(zero.row_count(), 0);
    assert_eq!(zero.names(), ["a"]);

    let exact = capped(3);
    assert_eq!(exact.row_count(), 3);
    assert_eq!(exact.get(0, 2).unwrap(), Value::Int(3));
}

#[test]
fn preset_cancel_flag_aborts_the_read() {
    let cancel = Arc::new(AtomicBool::new(true));
    let options = ReadOptions {
        cancel: Some(Arc::clone(&cancel)),
        ..ReadOptions::default()
    };
    let err = read_source(mem(b"a\n1\n2\n"), &options).unwrap_err();
    assert!(matches!(err, vellum::Error::Cancelled));
}

#[test]
fn shape_deviations_are_warnings_not_errors() {
    let table = read_source(mem(b"a,b\n1\n2,3,4\n5,6\n"), &ReadOptions::default()).unwrap();
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.get(1, 0).unwrap(), Value::Null);
    assert_eq!(table.get(1, 2).unwrap(), Value::Int(6));
    let problems = table.problems();
    assert_eq!(problems.len(), 2);
    assert_eq!(problems[0].row, 0);
    assert_eq!(problems[1].row, 1);
}

#[test]
fn malformed_quote_aborts_before_any_table() {
    let err = read_source(mem(b"a\n\"x\"junk\n"), &ReadOptions::default()).unwrap_err();
    assert!(matches!(err, vellum::Error::MalformedQuote { .. }));
}

#[test]
fn progress_counters_reach_the_sink() {
    use std::sync::Mutex;
    use vellum::{Progress, ProgressSink};

    #[derive(Default)]
    struct Capture(Mutex<Vec<Progress>>);
    impl ProgressSink for Capture {
        fn report(&self, progress: Progress) {
            self.0.lock().unwrap().push(progress);
        }
    }

    let sink = Arc::new(Capture::default());
    let options = ReadOptions {
        progress: Some(sink.clone()),
        ..ReadOptions::default()
    };
    read_source(mem(b"a,b\n1,2\n3,4\n"), &options).unwrap();

    let reports = sink.0.lock().unwrap();
    assert!(!reports.is_empty());
    let last = reports.last().unwrap();
    assert_eq!(last.rows_indexed, 2);
    assert_eq!(last.bytes_total, 12);
    assert!(last.bytes_indexed <= last.bytes_total);
}
