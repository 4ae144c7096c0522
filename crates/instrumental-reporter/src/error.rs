//! Error types for the reporter.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for reporter operations.
pub type ReporterResult<T> = Result<T, ReporterError>;

/// Which handshake line a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    Hello,
    Authenticate,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStage::Hello => f.write_str("HELLO"),
            HandshakeStage::Authenticate => f.write_str("AUTHENTICATE"),
        }
    }
}

/// Coarse failure class, used as a structured log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Dial,
    Handshake,
    Write,
    Config,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Dial => "dial",
            FailureKind::Handshake => "handshake",
            FailureKind::Write => "write",
            FailureKind::Config => "config",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while connecting to or streaming to a collector.
#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("write {stage}: {source}")]
    HandshakeWrite {
        stage: HandshakeStage,
        #[source]
        source: io::Error,
    },

    #[error("no response for {stage}; error: {}", fmt_cause(.source))]
    NoResponse {
        stage: HandshakeStage,
        #[source]
        source: Option<io::Error>,
    },

    #[error("unsuccessful {stage}: {response}")]
    Rejected {
        stage: HandshakeStage,
        response: String,
    },

    #[error("write metrics: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("hostname lookup failed: {0}")]
    Hostname(#[source] io::Error),
}

impl ReporterError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ReporterError::Dial { .. } => FailureKind::Dial,
            ReporterError::HandshakeWrite { .. }
            | ReporterError::NoResponse { .. }
            | ReporterError::Rejected { .. } => FailureKind::Handshake,
            ReporterError::Write { .. } => FailureKind::Write,
            ReporterError::Config(_) | ReporterError::Hostname(_) => FailureKind::Config,
        }
    }

    /// The collector answered the `authenticate` line with something other
    /// than `ok`, i.e. the token was refused.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            ReporterError::Rejected {
                stage: HandshakeStage::Authenticate,
                ..
            }
        )
    }
}

fn fmt_cause(source: &Option<io::Error>) -> String {
    match source {
        Some(e) => e.to_string(),
        None => "connection closed".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_stage() {
        let err = ReporterError::Rejected {
            stage: HandshakeStage::Hello,
            response: "no".to_string(),
        };
        assert_eq!(err.to_string(), "unsuccessful HELLO: no");
        assert_eq!(err.kind(), FailureKind::Handshake);
        assert!(!err.is_auth_rejection());

        let err = ReporterError::NoResponse {
            stage: HandshakeStage::Authenticate,
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "no response for AUTHENTICATE; error: connection closed"
        );
    }

    #[test]
    fn auth_rejection_is_detected() {
        let err = ReporterError::Rejected {
            stage: HandshakeStage::Authenticate,
            response: "fail".to_string(),
        };
        assert!(err.is_auth_rejection());
    }

    #[test]
    fn kinds_cover_every_failure_class() {
        let io = || io::Error::other("boom");
        assert_eq!(
            ReporterError::Dial {
                addr: "x:1".into(),
                source: io()
            }
            .kind(),
            FailureKind::Dial
        );
        assert_eq!(ReporterError::Write { source: io() }.kind(), FailureKind::Write);
        assert_eq!(
            ReporterError::HandshakeWrite {
                stage: HandshakeStage::Hello,
                source: io()
            }
            .kind(),
            FailureKind::Handshake
        );
        assert_eq!(ReporterError::Config("x".into()).kind().as_str(), "config");
    }
}
