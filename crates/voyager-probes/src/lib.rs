//! The probe embedder: a registry of lifecycle-phase-scoped measurements
//! that fire in priority order, cache their own last result, and publish
//! themselves as events with alert-escalated severity.

pub mod alert;
pub mod command;
pub mod error;
pub mod phase;
pub mod probe;
pub mod registry;

pub use alert::{AlertCondition, Operator, Severity};
pub use command::Command;
pub use error::{ProbeError, ProbeOutcome};
pub use phase::Phase;
pub use probe::{MeasureFn, Probe, ProbeContext, ProbeId, ProbeResult, TeardownFn};
pub use registry::Embedder;
