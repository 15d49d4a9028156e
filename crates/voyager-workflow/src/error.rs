//! Error types for the Voyager workflow engine.

use voyager_core::{BrowserError, TaskId};

/// Result type alias for workflow engine operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Error kinds spanning the scheduler, reconciler, step executor, and
/// workflow runner. Kept as one enum per crate, matching this codebase's
/// convention of a single error type per component boundary rather than one
/// type per module.
#[derive(thiserror::Error, Debug, Clone)]
pub enum WorkflowError {
    /// The workflow definition itself is malformed (unknown step type,
    /// `dependsOn` referencing an undefined task, duplicate task name).
    #[error("invalid workflow definition: {0}")]
    ParseError(String),

    /// The dependency graph contains a cycle; lists every task on it.
    #[error("cycle detected among tasks: {0:?}")]
    CycleDetected(Vec<TaskId>),

    /// A reconciler transition was attempted that the state machine does
    /// not allow.
    #[error("invalid transition for task {task}: {from} -> {to}")]
    InvalidTransition {
        task: TaskId,
        from: &'static str,
        to: &'static str,
    },

    /// A reconciler operation referenced a task that was never registered.
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    /// A step failed; wraps the underlying browser or protocol error.
    #[error("step failed: {0}")]
    StepFailed(String),

    /// A step or the whole workflow exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Cooperative cancellation (fail-fast, workflow timeout, external
    /// cancel) reached this task before it could continue.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A reconciler invariant was violated — a programming error, not a
    /// recoverable runtime condition.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Errors that are never retried regardless of a task's retry budget.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkflowError::ParseError(_)
                | WorkflowError::CycleDetected(_)
                | WorkflowError::Cancelled(_)
                | WorkflowError::Internal(_)
        )
    }
}

impl From<BrowserError> for WorkflowError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::Timeout(msg) => WorkflowError::Timeout(msg),
            other => WorkflowError::StepFailed(other.to_string()),
        }
    }
}
