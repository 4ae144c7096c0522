//! Histogram backed by a uniform reservoir sample.
//!
//! The reservoir keeps at most `reservoir_size` values chosen uniformly from
//! everything ever recorded (Vitter's algorithm R), so statistics describe
//! the whole lifetime of the histogram, not the window since the last read.

use parking_lot::Mutex;
use rand::Rng;

/// Default number of values retained by the reservoir.
pub const DEFAULT_RESERVOIR_SIZE: usize = 1028;

/// A histogram of `i64` observations.
#[derive(Debug)]
pub struct Histogram {
    sample: Mutex<UniformSample>,
}

#[derive(Debug)]
struct UniformSample {
    /// Total number of updates, including values evicted from the reservoir.
    count: u64,
    reservoir_size: usize,
    values: Vec<i64>,
}

impl UniformSample {
    fn new(reservoir_size: usize) -> Self {
        Self {
            count: 0,
            reservoir_size,
            values: Vec::with_capacity(reservoir_size.min(DEFAULT_RESERVOIR_SIZE)),
        }
    }

    fn update(&mut self, value: i64) {
        self.count += 1;
        if self.values.len() < self.reservoir_size {
            self.values.push(value);
            return;
        }
        let slot = rand::thread_rng().gen_range(0..self.count);
        if let Ok(slot) = usize::try_from(slot) {
            if slot < self.values.len() {
                self.values[slot] = value;
            }
        }
    }

    fn clear(&mut self) {
        self.count = 0;
        self.values.clear();
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_reservoir(DEFAULT_RESERVOIR_SIZE)
    }

    /// Create a histogram retaining at most `size` values (minimum 1).
    pub fn with_reservoir(size: usize) -> Self {
        Self {
            sample: Mutex::new(UniformSample::new(size.max(1))),
        }
    }

    pub fn update(&self, value: i64) {
        self.sample.lock().update(value);
    }

    pub fn clear(&self) {
        self.sample.lock().clear();
    }

    pub fn count(&self) -> u64 {
        self.sample.lock().count
    }

    /// Copy the reservoir out under the lock; all statistics are computed
    /// on the copy.
    pub fn snapshot(&self) -> HistogramSnapshot {
        let sample = self.sample.lock();
        HistogramSnapshot::from_values(sample.count, sample.values.clone())
    }
}

/// Immutable view of a histogram at the moment it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    count: u64,
    /// Reservoir contents, sorted ascending.
    values: Vec<i64>,
}

impl HistogramSnapshot {
    /// Build a snapshot from a total update count and the sampled values.
    pub fn from_values(count: u64, mut values: Vec<i64>) -> Self {
        values.sort_unstable();
        Self { count, values }
    }

    /// Total number of updates recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn min(&self) -> i64 {
        self.values.first().copied().unwrap_or(0)
    }

    pub fn max(&self) -> i64 {
        self.values.last().copied().unwrap_or(0)
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|v| *v as f64).sum::<f64>() / self.values.len() as f64
    }

    /// Population variance of the sampled values.
    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum: f64 = self
            .values
            .iter()
            .map(|v| {
                let d = *v as f64 - mean;
                d * d
            })
            .sum();
        sum / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Value at quantile `q` (0.0..=1.0).
    pub fn percentile(&self, q: f64) -> f64 {
        percentile_of_sorted(&self.values, q)
    }

    pub fn percentiles(&self, qs: &[f64]) -> Vec<f64> {
        qs.iter().map(|q| self.percentile(*q)).collect()
    }
}

/// Interpolated percentile over sorted values.
///
/// pos = q * (n + 1); below the first rank clamps to the minimum, at or past
/// the last rank clamps to the maximum, otherwise interpolates linearly
/// between the neighbouring ranks. A NaN quantile reads as the minimum.
fn percentile_of_sorted(sorted: &[i64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let pos = q * (n as f64 + 1.0);
    if pos.is_nan() || pos < 1.0 {
        sorted[0] as f64
    } else if pos >= n as f64 {
        sorted[n - 1] as f64
    } else {
        let rank = pos.floor() as usize;
        let lower = sorted[rank - 1] as f64;
        let upper = sorted[rank] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }
}
