//! Reporter configuration.

use std::time::Duration;

use crate::error::{ReporterError, ReporterResult};

/// Address of the public Instrumental collector.
pub const DEFAULT_ADDR: &str = "collector.instrumentalapp.com:8000";

/// Delay between a failed attempt and the next dial.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Deadline applied to dial, each handshake exchange, and each line write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the reporting interval and the retry delay.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Immutable settings for one [`Reporter`](crate::Reporter).
#[derive(Debug, Clone, PartialEq)]
pub struct ReporterConfig {
    /// Collector address as `host:port`.
    pub addr: String,
    /// Project token sent in the `authenticate` line.
    pub token: String,
    /// Prepended to every metric name, joined with `.`.
    pub prefix: String,
    /// How often a registry snapshot is sent.
    pub interval: Duration,
    /// Constant backoff between connection attempts.
    pub retry_delay: Duration,
    /// `None` waits forever.
    pub dial_timeout: Option<Duration>,
    /// Bounds each handshake write and each wait for an `ok`.
    pub handshake_timeout: Option<Duration>,
    /// Bounds each metric line write.
    pub write_timeout: Option<Duration>,
    /// Keep retrying when the collector refuses the token. When false the
    /// reporter stops after the first `AUTHENTICATE` rejection.
    pub retry_on_auth_failure: bool,
}

impl ReporterConfig {
    pub fn new(token: impl Into<String>, prefix: impl Into<String>, interval: Duration) -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            token: token.into(),
            prefix: prefix.into(),
            interval,
            retry_delay: DEFAULT_RETRY_DELAY,
            dial_timeout: Some(DEFAULT_IO_TIMEOUT),
            handshake_timeout: Some(DEFAULT_IO_TIMEOUT),
            write_timeout: Some(DEFAULT_IO_TIMEOUT),
            retry_on_auth_failure: true,
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Apply the same deadline to dial, handshake and writes.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dial_timeout = timeout;
        self.handshake_timeout = timeout;
        self.write_timeout = timeout;
        self
    }

    pub fn with_retry_on_auth_failure(mut self, retry: bool) -> Self {
        self.retry_on_auth_failure = retry;
        self
    }

    /// Check the settings a reporter cannot run without.
    pub fn validate(&self) -> ReporterResult<()> {
        if self.addr.trim().is_empty() {
            return Err(ReporterError::Config("collector address is empty".into()));
        }
        if !self.addr.contains(':') {
            return Err(ReporterError::Config(format!(
                "collector address {:?} has no port",
                self.addr
            )));
        }
        if self.interval.is_zero() {
            return Err(ReporterError::Config("reporting interval must be non-zero".into()));
        }
        if self.interval > MAX_INTERVAL || self.retry_delay > MAX_INTERVAL {
            return Err(ReporterError::Config(format!(
                "reporting interval and retry delay must be at most {MAX_INTERVAL:?}"
            )));
        }
        if self.token.contains(['\n', '\r']) {
            return Err(ReporterError::Config("token contains a line break".into()));
        }
        Ok(())
    }
}
