//! The chunked writer pipeline.
//!
//! The caller thread serializes: it owns the sink, receives tagged
//! buffers from the worker pool, and appends them in sequence order
//! using a min-heap keyed on the chunk number. Workers never touch the
//! sink.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crossbeam_channel::bounded;
use vellum_result::{Error, Result};
use vellum_source::Codec;
use vellum_table::{Table, Value};

use crate::format::{WriteOptions, format_chunk, format_header};

/// Write a table to `path`, wrapping the sink with a compression
/// encoder when the suffix names one (`.gz`, `.bz2`, `.xz`).
pub fn write_table(table: &Table, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    match Codec::from_path(path) {
        Some(codec) => {
            let sink = codec.wrap_writer(Box::new(BufWriter::new(file)))?;
            write_table_to_writer(table, sink, options)
        }
        None => write_table_to_writer(table, BufWriter::new(file), options),
    }
}

/// Write a table to a caller-supplied sink. Bytes are forwarded
/// untouched; no compression framing is added here.
pub fn write_table_to_writer<W: Write + Send>(
    table: &Table,
    sink: W,
    options: &WriteOptions,
) -> Result<()> {
    let names: Vec<String> = table.names().iter().map(|s| s.to_string()).collect();
    let rows = table.iter_rows();
    write_rows(&names, rows, sink, options)
}

/// Write rows from any fallible row iterator.
pub fn write_rows<W, I>(names: &[String], rows: I, mut sink: W, options: &WriteOptions) -> Result<()>
where
    W: Write + Send,
    I: Iterator<Item = Result<Vec<Value>>> + Send,
{
    if options.include_header && !names.is_empty() {
        sink.write_all(&format_header(names, options)?)?;
    }

    let chunk_rows = options.chunk_rows.max(1);
    if options.num_threads <= 1 {
        // Single-threaded path: format and emit in place.
        let mut chunk = Vec::with_capacity(chunk_rows);
        for row in rows {
            chunk.push(row?);
            if chunk.len() == chunk_rows {
                sink.write_all(&format_chunk(&chunk, options)?)?;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            sink.write_all(&format_chunk(&chunk, options)?)?;
        }
        sink.flush()?;
        return Ok(());
    }

    let workers = options.num_threads;
    tracing::debug!(workers, chunk_rows, "formatting chunks in parallel");
    let (chunk_tx, chunk_rx) = bounded::<(u64, Vec<Vec<Value>>)>(workers * 2);
    let (buf_tx, buf_rx) = bounded::<(u64, Result<Vec<u8>>)>(workers * 2);
    let (err_tx, err_rx) = bounded::<Error>(1);

    let mut sink_error: Option<Error> = None;

    rayon::scope(|scope| {
        for _ in 0..workers {
            let chunk_rx = chunk_rx.clone();
            let buf_tx = buf_tx.clone();
            scope.spawn(move |_| {
                for (seq, chunk) in chunk_rx.iter() {
                    let formatted = format_chunk(&chunk, options);
                    if buf_tx.send((seq, formatted)).is_err() {
                        break;
                    }
                }
            });
        }
        // The spawning thread's copies must drop so the channels close
        // once the producer and workers finish.
        drop(chunk_rx);
        drop(buf_tx);

        scope.spawn(move |_| {
            let mut seq = 0u64;
            let mut chunk = Vec::with_capacity(chunk_rows);
            for row in rows {
                match row {
                    Ok(row) => {
                        chunk.push(row);
                        if chunk.len() == chunk_rows {
                            let full =
                                std::mem::replace(&mut chunk, Vec::with_capacity(chunk_rows));
                            if chunk_tx.send((seq, full)).is_err() {
                                return;
                            }
                            seq += 1;
                        }
                    }
                    Err(err) => {
                        let _ = err_tx.send(err);
                        return;
                    }
                }
            }
            if !chunk.is_empty() {
                let _ = chunk_tx.send((seq, chunk));
            }
        });

        // Serialize on the caller thread: reassemble in chunk order.
        // A formatting failure leaves a gap in the sequence, so later
        // chunks stay pending and are discarded with the error.
        let mut next = 0u64;
        let mut pending: BinaryHeap<(Reverse<u64>, Vec<u8>)> = BinaryHeap::new();
        for (seq, formatted) in buf_rx.iter() {
            match formatted {
                Ok(buf) => pending.push((Reverse(seq), buf)),
                Err(err) => {
                    if sink_error.is_none() {
                        sink_error = Some(err);
                    }
                    continue;
                }
            }
            while let Some((Reverse(seq), _)) = pending.peek() {
                if *seq != next {
                    break;
                }
                let Some((_, buf)) = pending.pop() else {
                    break;
                };
                if sink_error.is_none()
                    && let Err(err) = sink.write_all(&buf)
                {
                    sink_error = Some(err.into());
                }
                next += 1;
            }
        }
    });

    if let Ok(err) = err_rx.try_recv() {
        return Err(err);
    }
    if let Some(err) = sink_error {
        return Err(err);
    }
    sink.flush()?;
    Ok(())
}
