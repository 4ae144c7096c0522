//! instrumental-reporter: stream metrics to an Instrumental collector.
//!
//! Snapshots a [`MetricSource`](instrumental_metrics::MetricSource) on a
//! fixed interval, flattens each metric into `gauge` lines, and writes them
//! over a persistent TCP connection that is re-established after any
//! failure.
//!
//! # Architecture
//!
//! ```text
//! Reporter (connection manager, composition root)
//!   ├── transport::Dialer      → byte stream to the collector
//!   ├── connection::Connection → hello / authenticate handshake
//!   ├── connection::Streaming  → metric writes + diagnostic drain task
//!   └── encoder::encode()      → registry snapshot → wire lines
//! ```
//!
//! # Wire protocol
//!
//! ```text
//! C: hello version <client-id> hostname <h> pid <p> runtime <rt> platform <os>-<arch>
//! S: ok
//! C: authenticate <token>
//! S: ok
//! C: gauge <prefix>.<name> <value> <unix-seconds>     (repeated every tick)
//! ```

pub mod config;
pub mod connection;
pub mod encoder;
pub mod error;
pub mod greeting;
pub mod reporter;
pub mod transport;

pub use config::{ReporterConfig, DEFAULT_ADDR};
pub use error::{FailureKind, HandshakeStage, ReporterError, ReporterResult};
pub use greeting::Greeting;
pub use reporter::{Reporter, ReporterHandle, ReporterState};
pub use transport::{Dialer, TcpDialer};
