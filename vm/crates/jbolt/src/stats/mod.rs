//! Reordering statistics
//!
//! Counters accumulated over the lifetime of the engine, for tuning
//! `JBoltCodeHeapSize` and the trigger schedule.

pub mod histogram;
pub mod timer;

pub use histogram::Histogram;
pub use timer::PassTimer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::reorder::PassReport;

pub struct ReorderStats {
    passes: AtomicU64,
    dump_passes: AtomicU64,
    relocations: AtomicU64,
    evictions: AtomicU64,
    bytes_moved: AtomicU64,
    capacity_exhausted: AtomicU64,
    /// Pass duration in nanoseconds
    pass_times: Arc<Histogram>,
    start_time: Instant,
}

impl ReorderStats {
    pub fn new() -> Self {
        Self {
            passes: AtomicU64::new(0),
            dump_passes: AtomicU64::new(0),
            relocations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            bytes_moved: AtomicU64::new(0),
            capacity_exhausted: AtomicU64::new(0),
            pass_times: Arc::new(Histogram::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_pass(&self, report: &PassReport) {
        self.passes.fetch_add(1, Ordering::Relaxed);
        if report.dumped.is_some() {
            self.dump_passes.fetch_add(1, Ordering::Relaxed);
        }
        self.relocations
            .fetch_add(report.relocated as u64, Ordering::Relaxed);
        self.evictions
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        self.bytes_moved
            .fetch_add(report.bytes_moved as u64, Ordering::Relaxed);
        self.capacity_exhausted
            .fetch_add(report.capacity_exhausted as u64, Ordering::Relaxed);
        self.pass_times.record(report.duration.as_nanos() as u64);
    }

    pub fn pass_times(&self) -> Arc<Histogram> {
        Arc::clone(&self.pass_times)
    }

    pub fn summary(&self) -> ReorderSummary {
        ReorderSummary {
            passes: self.passes.load(Ordering::Relaxed),
            dump_passes: self.dump_passes.load(Ordering::Relaxed),
            relocations: self.relocations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_moved: self.bytes_moved.load(Ordering::Relaxed),
            capacity_exhausted: self.capacity_exhausted.load(Ordering::Relaxed),
            avg_pass_ms: self.pass_times.mean() as f64 / 1_000_000.0,
            max_pass_ms: self.pass_times.max() as f64 / 1_000_000.0,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn reset(&self) {
        self.passes.store(0, Ordering::Relaxed);
        self.dump_passes.store(0, Ordering::Relaxed);
        self.relocations.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.bytes_moved.store(0, Ordering::Relaxed);
        self.capacity_exhausted.store(0, Ordering::Relaxed);
        self.pass_times.clear();
    }
}

impl Default for ReorderStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReorderSummary {
    pub passes: u64,
    pub dump_passes: u64,
    pub relocations: u64,
    pub evictions: u64,
    pub bytes_moved: u64,
    /// Methods left out of their target for lack of room
    pub capacity_exhausted: u64,
    pub avg_pass_ms: f64,
    pub max_pass_ms: f64,
    pub uptime_secs: u64,
}
