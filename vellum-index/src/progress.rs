//! Monotonic progress counters published while indexing.
//!
//! The core only publishes numbers; rendering them is the caller's
//! problem. Counters are cumulative and never decrease.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A snapshot of indexing progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub bytes_indexed: u64,
    pub rows_indexed: u64,
    pub bytes_total: u64,
}

/// Receives progress snapshots at chunk boundaries.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
}

/// Timing knobs for a progress UI, seeded from the environment.
#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    /// Seconds before a UI should appear (`READER_PROGRESS_SHOW_AFTER`).
    pub show_after: Duration,
    /// Seconds between updates (`READER_PROGRESS_UPDATE_INTERVAL`).
    pub update_interval: Duration,
}

pub const SHOW_AFTER_ENV: &str = "READER_PROGRESS_SHOW_AFTER";
pub const UPDATE_INTERVAL_ENV: &str = "READER_PROGRESS_UPDATE_INTERVAL";

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            show_after: env_secs(SHOW_AFTER_ENV, 2.0),
            update_interval: env_secs(UPDATE_INTERVAL_ENV, 0.25),
        }
    }
}

fn env_secs(var: &str, default: f64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .unwrap_or(default);
    Duration::from_secs_f64(secs)
}

/// Shared counters the scan workers bump; snapshots go to the sink.
#[derive(Default)]
pub(crate) struct ProgressCounters {
    pub bytes: AtomicU64,
    pub rows: AtomicU64,
}

impl ProgressCounters {
    pub fn snapshot(&self, bytes_total: u64) -> Progress {
        Progress {
            bytes_indexed: self.bytes.load(Ordering::Relaxed),
            rows_indexed: self.rows.load(Ordering::Relaxed),
            bytes_total,
        }
    }

    pub fn add(&self, bytes: u64, rows: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.rows.fetch_add(rows, Ordering::Relaxed);
    }
}
