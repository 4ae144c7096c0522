//! Samples the agent's own process into a [`Registry`].
//!
//! | metric                  | kind        | source                  |
//! |-------------------------|-------------|-------------------------|
//! | `process.uptime`        | gauge (s)   | monotonic clock         |
//! | `process.cpu_seconds`   | float gauge | `/proc/self/stat` ticks |
//! | `process.rss_bytes`     | gauge       | `/proc/self/stat` pages |
//! | `process.threads`       | gauge       | `/proc/self/stat`       |
//! | `agent.samples`         | meter       | one mark per sample     |
//! | `agent.sample_duration` | timer       | time spent sampling     |
//! | `agent.sample_errors`   | counter     | unreadable sources      |

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use instrumental_metrics::{Counter, FloatGauge, Gauge, Meter, Registry, RegistryResult, Timer};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// The fields of `/proc/<pid>/stat` the sampler uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcStat {
    pub utime_ticks: u64,
    pub stime_ticks: u64,
    pub threads: i64,
    pub rss_pages: i64,
}

impl ProcStat {
    /// Parse the single line of `/proc/<pid>/stat`.
    ///
    /// The command name (field 2) may contain spaces and parentheses, so
    /// fields are counted from the last `)`.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = &line[line.rfind(')')? + 1..];
        let fields: Vec<&str> = rest.split_whitespace().collect();
        // fields[0] is field 3 (state).
        let field = |n: usize| fields.get(n - 3).copied();
        Some(Self {
            utime_ticks: field(14)?.parse().ok()?,
            stime_ticks: field(15)?.parse().ok()?,
            threads: field(20)?.parse().ok()?,
            rss_pages: field(24)?.parse().ok()?,
        })
    }

    pub fn cpu_seconds(&self, ticks_per_sec: f64) -> f64 {
        (self.utime_ticks + self.stime_ticks) as f64 / ticks_per_sec
    }
}

#[cfg(target_os = "linux")]
fn read_stat() -> io::Result<ProcStat> {
    let content = std::fs::read_to_string("/proc/self/stat")?;
    ProcStat::parse(&content)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/self/stat"))
}

#[cfg(not(target_os = "linux"))]
fn read_stat() -> io::Result<ProcStat> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process statistics are only available on linux",
    ))
}

#[cfg(unix)]
fn sysconf_or(name: libc::c_int, fallback: i64) -> i64 {
    // SAFETY: sysconf only reads a system constant.
    let value = unsafe { libc::sysconf(name) };
    if value > 0 { value as i64 } else { fallback }
}

#[cfg(unix)]
fn clock_ticks() -> f64 {
    sysconf_or(libc::_SC_CLK_TCK, 100) as f64
}

#[cfg(unix)]
fn page_size() -> i64 {
    sysconf_or(libc::_SC_PAGESIZE, 4096)
}

#[cfg(not(unix))]
fn clock_ticks() -> f64 {
    100.0
}

#[cfg(not(unix))]
fn page_size() -> i64 {
    4096
}

/// Handles to the process metrics, registered once.
pub struct ProcessSampler {
    started: Instant,
    clock_ticks: f64,
    page_size: i64,
    uptime: Arc<Gauge>,
    cpu_seconds: Arc<FloatGauge>,
    rss_bytes: Arc<Gauge>,
    threads: Arc<Gauge>,
    samples: Arc<Meter>,
    sample_duration: Arc<Timer>,
    sample_errors: Arc<Counter>,
}

impl ProcessSampler {
    pub fn register(registry: &Registry) -> RegistryResult<Self> {
        Ok(Self {
            started: Instant::now(),
            clock_ticks: clock_ticks(),
            page_size: page_size(),
            uptime: registry.gauge("process.uptime")?,
            cpu_seconds: registry.float_gauge("process.cpu_seconds")?,
            rss_bytes: registry.gauge("process.rss_bytes")?,
            threads: registry.gauge("process.threads")?,
            samples: registry.meter("agent.samples")?,
            sample_duration: registry.timer("agent.sample_duration")?,
            sample_errors: registry.counter("agent.sample_errors")?,
        })
    }

    /// Take one sample. Sources that cannot be read leave their metrics
    /// unchanged and bump `agent.sample_errors`.
    pub fn sample(&self) {
        let start = Instant::now();
        self.uptime.update(self.started.elapsed().as_secs() as i64);

        match read_stat() {
            Ok(stat) => self.record(&stat),
            Err(e) => {
                self.sample_errors.inc(1);
                debug!(error = %e, "process stat unavailable");
            }
        }

        self.samples.mark(1);
        self.sample_duration.update_since(start);
    }

    fn record(&self, stat: &ProcStat) {
        self.cpu_seconds.update(stat.cpu_seconds(self.clock_ticks));
        self.rss_bytes.update(stat.rss_pages.saturating_mul(self.page_size));
        self.threads.update(stat.threads);
    }

    /// Sample every `interval` until `shutdown` flips.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?interval, "process sampler started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sample(),
                _ = shutdown.changed() => {
                    info!("process sampler shutting down");
                    return;
                }
            }
        }
    }
}
