//! instrumental.toml configuration.
//!
//! ```toml
//! [collector]
//! addr = "collector.instrumentalapp.com:8000"
//! token = "..."
//! prefix = "myapp"
//!
//! [reporting]
//! interval = "10s"
//! retry_delay = "1s"
//! dial_timeout = "10s"
//! handshake_timeout = "10s"
//! write_timeout = "off"
//! retry_on_auth_failure = true
//!
//! [sampler]
//! interval = "5s"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use instrumental_reporter::{DEFAULT_ADDR, ReporterConfig};
use serde::{Deserialize, Serialize};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_PATH: &str = "instrumental.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub collector: CollectorConfig,
    pub reporting: ReportingConfig,
    pub sampler: SamplerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    pub addr: String,
    pub token: String,
    pub prefix: String,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            token: String::new(),
            prefix: "agent".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportingConfig {
    pub interval: String,
    pub retry_delay: String,
    pub dial_timeout: String,
    pub handshake_timeout: String,
    pub write_timeout: String,
    pub retry_on_auth_failure: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            retry_delay: "1s".to_string(),
            dial_timeout: "10s".to_string(),
            handshake_timeout: "10s".to_string(),
            write_timeout: "10s".to_string(),
            retry_on_auth_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplerConfig {
    pub interval: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: "5s".to_string(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub addr: Option<String>,
    pub token: Option<String>,
    pub prefix: Option<String>,
    pub interval: Option<String>,
}

impl AgentConfig {
    /// Load from `path`, or from [`DEFAULT_PATH`] if it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file just means defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_PATH).exists() => Self::from_file(Path::new(DEFAULT_PATH)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(addr) = overrides.addr {
            self.collector.addr = addr;
        }
        if let Some(token) = overrides.token {
            self.collector.token = token;
        }
        if let Some(prefix) = overrides.prefix {
            self.collector.prefix = prefix;
        }
        if let Some(interval) = overrides.interval {
            self.reporting.interval = interval;
        }
    }

    pub fn sample_interval(&self) -> anyhow::Result<Duration> {
        parse_duration(&self.sampler.interval).context("sampler.interval")
    }

    /// Resolve durations and check everything the reporter needs.
    pub fn reporter_config(&self) -> anyhow::Result<ReporterConfig> {
        let collector = &self.collector;
        let reporting = &self.reporting;

        if collector.token.trim().is_empty() {
            bail!("collector.token is required (set it in the config file or pass --token)");
        }

        let interval = parse_duration(&reporting.interval).context("reporting.interval")?;
        let retry_delay = parse_duration(&reporting.retry_delay).context("reporting.retry_delay")?;

        let mut config = ReporterConfig::new(&collector.token, &collector.prefix, interval)
            .with_addr(&collector.addr)
            .with_retry_delay(retry_delay)
            .with_retry_on_auth_failure(reporting.retry_on_auth_failure);
        config.dial_timeout = parse_timeout(&reporting.dial_timeout).context("reporting.dial_timeout")?;
        config.handshake_timeout =
            parse_timeout(&reporting.handshake_timeout).context("reporting.handshake_timeout")?;
        config.write_timeout =
            parse_timeout(&reporting.write_timeout).context("reporting.write_timeout")?;

        config.validate()?;
        Ok(config)
    }
}

/// Parse `"500ms"`, `"10s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();
    let (digits, unit) = s
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| s.split_at(i))
        .unwrap_or((s, ""));
    let n: u64 = digits
        .parse()
        .with_context(|| format!("invalid duration {s:?}"))?;
    let secs_per_unit = match unit {
        "ms" => return Ok(Duration::from_millis(n)),
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "" => bail!("duration {s:?} needs a unit (ms, s, m, h)"),
        other => bail!("unknown duration unit {other:?} in {s:?}"),
    };
    n.checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .with_context(|| format!("duration {s:?} is too large"))
}

/// Like [`parse_duration`], but `"off"` means no timeout.
pub fn parse_timeout(s: &str) -> anyhow::Result<Option<Duration>> {
    if s.trim().eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    parse_duration(s).map(Some)
}
