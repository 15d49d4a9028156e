//! Error types for the probe embedder.

use thiserror::Error;

/// Result alias for probe operations. Named `ProbeOutcome` rather than the
/// usual `ProbeResult` convention because `ProbeResult` already names the
/// measurement record this crate produces.
pub type ProbeOutcome<T> = Result<T, ProbeError>;

#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("probe {0} not registered")]
    UnknownProbe(String),

    #[error("probe {probe} measurement failed: {reason}")]
    MeasureFailed { probe: String, reason: String },
}
