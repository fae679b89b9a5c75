//! Small timing helper used to log round statistics, mirroring the
//! `Timer::default()` / `.dur_ms()` pattern used throughout the
//! sample-based planners in this codebase family.

use std::time::Instant;

pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Timer { start: Instant::now() }
    }
}

impl Timer {
    pub fn dur_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
