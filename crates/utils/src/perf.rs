//! Telemetry timing marks
//!
//! The pipeline brackets each phase with a scoped timer. Mark names are
//! stable and consumed by the performance harness.

use std::time::Instant;

/// A scoped timer that reports its elapsed time when dropped
pub struct PerfTimer {
    mark: &'static str,
    start: Instant,
}

impl PerfTimer {
    pub fn start(mark: &'static str) -> Self {
        Self {
            mark,
            start: Instant::now(),
        }
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        let micros = self.start.elapsed().as_micros() as u64;
        tracing::debug!(target: "bcache::perf", mark = self.mark, micros, "perf");
    }
}
