//! Error types for the metrics registry.

use thiserror::Error;

use crate::registry::MetricKind;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors returned when registering or looking up metrics.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate metric: {0}")]
    Duplicate(String),

    #[error("metric {name} is a {found}, not a {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        found: MetricKind,
    },
}
