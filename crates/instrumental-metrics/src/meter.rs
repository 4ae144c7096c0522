//! Meter: event count plus exponentially-weighted moving average rates.
//!
//! The three EWMAs are advanced in fixed 5 second ticks. Ticks are applied
//! lazily on the next mark or read, so a meter needs no background task.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// A single exponentially-weighted moving average, in events per second.
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: i64,
    initialized: bool,
}

impl Ewma {
    fn over_minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self {
            alpha,
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    fn update(&mut self, n: i64) {
        self.uncounted += n;
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }
}

#[derive(Debug)]
struct MeterState {
    count: i64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
    start: Instant,
    last_tick: Instant,
}

impl MeterState {
    fn tick_if_necessary(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        if elapsed < TICK_INTERVAL {
            return;
        }
        let ticks = elapsed.as_nanos() / TICK_INTERVAL.as_nanos();
        for _ in 0..ticks {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
            self.last_tick += TICK_INTERVAL;
        }
    }
}

/// Counts events and tracks their rate over 1, 5 and 15 minute windows.
#[derive(Debug)]
pub struct Meter {
    state: Mutex<MeterState>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

impl Meter {
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// Create a meter whose mean rate is measured from `start`.
    pub fn with_start(start: Instant) -> Self {
        Self {
            state: Mutex::new(MeterState {
                count: 0,
                m1: Ewma::over_minutes(1.0),
                m5: Ewma::over_minutes(5.0),
                m15: Ewma::over_minutes(15.0),
                start,
                last_tick: start,
            }),
        }
    }

    /// Record `n` events now.
    pub fn mark(&self, n: i64) {
        self.mark_at(n, Instant::now());
    }

    /// Record `n` events at `now`.
    pub fn mark_at(&self, n: i64, now: Instant) {
        let mut state = self.state.lock();
        state.tick_if_necessary(now);
        state.count += n;
        state.m1.update(n);
        state.m5.update(n);
        state.m15.update(n);
    }

    pub fn count(&self) -> i64 {
        self.state.lock().count
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Read the meter as of `now`, applying any pending ticks first.
    pub fn snapshot_at(&self, now: Instant) -> MeterSnapshot {
        let mut state = self.state.lock();
        state.tick_if_necessary(now);

        let elapsed = now.saturating_duration_since(state.start).as_secs_f64();
        let rate_mean = if elapsed > 0.0 {
            state.count as f64 / elapsed
        } else {
            0.0
        };

        MeterSnapshot {
            count: state.count,
            rate1: state.m1.rate,
            rate5: state.m5.rate,
            rate15: state.m15.rate,
            rate_mean,
        }
    }
}

/// Immutable view of a meter. Rates are events per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterSnapshot {
    pub count: i64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    /// Mean rate since the meter was created.
    pub rate_mean: f64,
}
