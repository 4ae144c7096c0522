//! instrumental-metrics: the in-process metrics registry.
//!
//! Host code registers named metrics and updates them from any thread;
//! reporters read point-in-time snapshots through [`MetricSource`].
//!
//! # Architecture
//!
//! ```text
//! Registry
//!   ├── counter() / gauge() / float_gauge()   ← atomics
//!   ├── histogram()  → uniform reservoir sample
//!   ├── meter()      → count + 1/5/15-minute EWMA rates
//!   ├── timer()      → histogram of durations + meter
//!   └── MetricSource::for_each_metric() → (name, MetricSnapshot)
//! ```

pub mod counter;
pub mod error;
pub mod histogram;
pub mod meter;
pub mod registry;
pub mod timer;

pub use counter::{Counter, FloatGauge, Gauge};
pub use error::{RegistryError, RegistryResult};
pub use histogram::{Histogram, HistogramSnapshot};
pub use meter::{Meter, MeterSnapshot};
pub use registry::{Metric, MetricKind, MetricSnapshot, MetricSource, Registry};
pub use timer::{Timer, TimerSnapshot};
