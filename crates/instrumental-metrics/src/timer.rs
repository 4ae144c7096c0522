//! Timer: a histogram of durations plus a meter of how often they occur.

use std::time::{Duration, Instant};

use crate::histogram::{Histogram, HistogramSnapshot};
use crate::meter::{Meter, MeterSnapshot};

/// Durations are recorded in nanoseconds.
#[derive(Debug, Default)]
pub struct Timer {
    histogram: Histogram,
    meter: Meter,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a timer from existing parts (e.g. a custom reservoir size).
    pub fn from_parts(histogram: Histogram, meter: Meter) -> Self {
        Self { histogram, meter }
    }

    pub fn update(&self, elapsed: Duration) {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark(1);
    }

    pub fn update_since(&self, start: Instant) {
        self.update(start.elapsed());
    }

    /// Run `f` and record how long it took.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.update_since(start);
        out
    }

    pub fn count(&self) -> u64 {
        self.histogram.count()
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            histogram: self.histogram.snapshot(),
            meter: self.meter.snapshot(),
        }
    }
}

/// Immutable view of a timer.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    pub histogram: HistogramSnapshot,
    pub meter: MeterSnapshot,
}
