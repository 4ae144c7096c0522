//! Named metric registry and the read contract reporters consume.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::counter::{Counter, FloatGauge, Gauge};
use crate::error::{RegistryError, RegistryResult};
use crate::histogram::{Histogram, HistogramSnapshot};
use crate::meter::{Meter, MeterSnapshot};
use crate::timer::{Timer, TimerSnapshot};

/// The kinds of metric a [`Registry`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    FloatGauge,
    Histogram,
    Meter,
    Timer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::FloatGauge => "float gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Meter => "meter",
            MetricKind::Timer => "timer",
        };
        f.write_str(s)
    }
}

/// A live, shareable handle to a registered metric.
#[derive(Debug, Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    FloatGauge(Arc<FloatGauge>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::FloatGauge(_) => MetricKind::FloatGauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Meter(_) => MetricKind::Meter,
            Metric::Timer(_) => MetricKind::Timer,
        }
    }

    /// Read the metric's current values.
    pub fn snapshot(&self) -> MetricSnapshot {
        match self {
            Metric::Counter(c) => MetricSnapshot::Counter(c.count()),
            Metric::Gauge(g) => MetricSnapshot::Gauge(g.value()),
            Metric::FloatGauge(g) => MetricSnapshot::FloatGauge(g.value()),
            Metric::Histogram(h) => MetricSnapshot::Histogram(h.snapshot()),
            Metric::Meter(m) => MetricSnapshot::Meter(m.snapshot()),
            Metric::Timer(t) => MetricSnapshot::Timer(t.snapshot()),
        }
    }
}

/// Point-in-time values of one metric.
///
/// `Unknown` stands for anything a foreign [`MetricSource`] exposes that has
/// no scalar representation here; consumers skip it.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricSnapshot {
    Counter(i64),
    Gauge(i64),
    FloatGauge(f64),
    Histogram(HistogramSnapshot),
    Meter(MeterSnapshot),
    Timer(TimerSnapshot),
    Unknown,
}

/// Read side of a metrics registry.
///
/// Iteration order is not meaningful. Each entry is snapshotted when it is
/// visited.
pub trait MetricSource {
    fn for_each_metric(&self, f: &mut dyn FnMut(&str, MetricSnapshot));
}

impl MetricSource for [(String, MetricSnapshot)] {
    fn for_each_metric(&self, f: &mut dyn FnMut(&str, MetricSnapshot)) {
        for (name, snap) in self {
            f(name, snap.clone());
        }
    }
}

impl MetricSource for Vec<(String, MetricSnapshot)> {
    fn for_each_metric(&self, f: &mut dyn FnMut(&str, MetricSnapshot)) {
        self.as_slice().for_each_metric(f);
    }
}

/// Thread-safe map of metric name → metric.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: RwLock<BTreeMap<String, Metric>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `metric` under `name`. Fails if the name is taken.
    pub fn register(&self, name: &str, metric: Metric) -> RegistryResult<()> {
        let mut metrics = self.metrics.write();
        if metrics.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        metrics.insert(name.to_string(), metric);
        Ok(())
    }

    /// Remove a metric. Returns the handle if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Metric> {
        self.metrics.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.metrics.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.metrics.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.read().is_empty()
    }

    pub fn counter(&self, name: &str) -> RegistryResult<Arc<Counter>> {
        match self.get_or_insert(name, || Metric::Counter(Arc::default())) {
            Metric::Counter(c) => Ok(c),
            other => Err(mismatch(name, MetricKind::Counter, &other)),
        }
    }

    pub fn gauge(&self, name: &str) -> RegistryResult<Arc<Gauge>> {
        match self.get_or_insert(name, || Metric::Gauge(Arc::default())) {
            Metric::Gauge(g) => Ok(g),
            other => Err(mismatch(name, MetricKind::Gauge, &other)),
        }
    }

    pub fn float_gauge(&self, name: &str) -> RegistryResult<Arc<FloatGauge>> {
        match self.get_or_insert(name, || Metric::FloatGauge(Arc::default())) {
            Metric::FloatGauge(g) => Ok(g),
            other => Err(mismatch(name, MetricKind::FloatGauge, &other)),
        }
    }

    pub fn histogram(&self, name: &str) -> RegistryResult<Arc<Histogram>> {
        match self.get_or_insert(name, || Metric::Histogram(Arc::default())) {
            Metric::Histogram(h) => Ok(h),
            other => Err(mismatch(name, MetricKind::Histogram, &other)),
        }
    }

    pub fn meter(&self, name: &str) -> RegistryResult<Arc<Meter>> {
        match self.get_or_insert(name, || Metric::Meter(Arc::default())) {
            Metric::Meter(m) => Ok(m),
            other => Err(mismatch(name, MetricKind::Meter, &other)),
        }
    }

    pub fn timer(&self, name: &str) -> RegistryResult<Arc<Timer>> {
        match self.get_or_insert(name, || Metric::Timer(Arc::default())) {
            Metric::Timer(t) => Ok(t),
            other => Err(mismatch(name, MetricKind::Timer, &other)),
        }
    }

    fn get_or_insert(&self, name: &str, make: impl FnOnce() -> Metric) -> Metric {
        if let Some(existing) = self.metrics.read().get(name) {
            return existing.clone();
        }
        self.metrics
            .write()
            .entry(name.to_string())
            .or_insert_with(make)
            .clone()
    }
}

impl MetricSource for Registry {
    fn for_each_metric(&self, f: &mut dyn FnMut(&str, MetricSnapshot)) {
        // Snapshots run after the map lock is released.
        let entries: Vec<(String, Metric)> = self
            .metrics
            .read()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.clone()))
            .collect();

        for (name, metric) in entries {
            f(&name, metric.snapshot());
        }
    }
}

fn mismatch(name: &str, expected: MetricKind, found: &Metric) -> RegistryError {
    RegistryError::KindMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}
