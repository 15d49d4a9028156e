//! Dependency scheduler, reconciliation state machine, retry policy, step
//! executor, and workflow runner — the four leaf components of the
//! browser-automation workflow execution engine wired into one top-level
//! `WorkflowRunner::run` call.

pub mod dag;
pub mod error;
pub mod executor;
pub mod outcome;
pub mod retry;
pub mod state;
pub mod step_executor;

pub use dag::{plan, Batch, OutputSpec, Task, Workflow, WorkflowPolicy};
pub use error::{WorkflowError, WorkflowResult};
pub use executor::WorkflowRunner;
pub use outcome::{TaskOutcome, WorkflowOutcome, WorkflowStatus};
pub use retry::{RetryPolicy, RetryState};
pub use state::{CancelCause, Reconciler, TaskState, TaskStatus, Transition};
pub use step_executor::execute_step;

/// Re-exports for downstream crates that want the whole public surface
/// with one `use voyager_workflow::prelude::*;`.
pub mod prelude {
    pub use crate::{
        execute_step, plan, Batch, CancelCause, OutputSpec, Reconciler, RetryPolicy, Task,
        TaskOutcome, TaskState, TaskStatus, Transition, Workflow, WorkflowError, WorkflowOutcome,
        WorkflowPolicy, WorkflowResult, WorkflowRunner, WorkflowStatus,
    };
}
