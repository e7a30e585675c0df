//! Logical clock
//!
//! 64-bit, strictly monotonic per node. Ticks follow wall-clock microseconds
//! when the wall clock moves forward and fall back to `last + 1` otherwise,
//! so timestamps stay comparable across nodes with roughly synchronized clocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicU64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, strictly greater than every value returned or observed before
    pub fn tick(&self) -> u64 {
        let wall = wall_micros();
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    /// Fold in a timestamp seen elsewhere (replicated write, recovered log)
    pub fn observe(&self, timestamp: u64) {
        self.last.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// Current reading without advancing
    pub fn now(&self) -> u64 {
        wall_micros().max(self.last.load(Ordering::Acquire))
    }
}

/// Wall clock in microseconds since the epoch
pub fn wall_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
