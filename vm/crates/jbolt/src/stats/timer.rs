//! Pass timing

use std::time::{Duration, Instant};

/// Measures one reordering pass
pub struct PassTimer {
    start: Instant,
}

impl PassTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed().as_nanos() as u64
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for PassTimer {
    fn default() -> Self {
        Self::new()
    }
}
