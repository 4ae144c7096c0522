//! The `hello` line identifying this process to the collector.
//!
//! Built once when the host wires the reporter together and then reused
//! verbatim for every handshake, so reconnects always present the same
//! identity.

use std::fmt;
use std::io;

use crate::error::{ReporterError, ReporterResult};

/// Client identifier advertised in the greeting.
pub const CLIENT_ID: &str = concat!(
    "rust/",
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

/// Toolchain the reporter was built for.
pub const RUNTIME: &str = concat!("rust", env!("CARGO_PKG_RUST_VERSION"));

/// Process identity sent on every fresh connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub client_id: String,
    pub hostname: String,
    pub pid: u32,
    pub runtime: String,
    pub os: String,
    pub arch: String,
}

impl Greeting {
    /// Discover the identity of the current process.
    pub fn detect() -> ReporterResult<Self> {
        let hostname = hostname().map_err(ReporterError::Hostname)?;
        Ok(Self {
            client_id: CLIENT_ID.to_string(),
            hostname,
            pid: std::process::id(),
            runtime: RUNTIME.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        })
    }

    /// The greeting as it goes on the wire, newline included.
    pub fn line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Greeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "hello version {} hostname {} pid {} runtime {} platform {}-{}",
            self.client_id, self.hostname, self.pid, self.runtime, self.os, self.arch
        )
    }
}

#[cfg(unix)]
fn hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the pointer and length describe `buf`, which outlives the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let len = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    if name.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "empty hostname"));
    }
    Ok(name)
}

#[cfg(not(unix))]
fn hostname() -> io::Result<String> {
    std::env::var("COMPUTERNAME")
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed() -> Greeting {
        Greeting {
            client_id: "rust/instrumental-reporter/0.1.0".into(),
            hostname: "web-1".into(),
            pid: 4242,
            runtime: "rust1.85".into(),
            os: "linux".into(),
            arch: "x86_64".into(),
        }
    }

    #[test]
    fn line_format() {
        assert_eq!(
            fixed().line(),
            "hello version rust/instrumental-reporter/0.1.0 hostname web-1 pid 4242 \
             runtime rust1.85 platform linux-x86_64\n"
        );
    }

    #[test]
    fn detect_fills_process_identity() {
        let greeting = Greeting::detect().unwrap();
        assert_eq!(greeting.pid, std::process::id());
        assert!(!greeting.hostname.is_empty());
        assert!(greeting.client_id.starts_with("rust/instrumental-reporter/"));
        assert!(greeting.runtime.starts_with("rust"));
        assert_eq!(greeting.os, std::env::consts::OS);
        assert!(greeting.line().ends_with('\n'));
    }

    #[test]
    fn detect_is_stable_within_a_process() {
        assert_eq!(Greeting::detect().unwrap(), Greeting::detect().unwrap());
    }
}
