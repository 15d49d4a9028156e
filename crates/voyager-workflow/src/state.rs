//! Per-task reconciliation state machine.
//!
//! One `Reconciler` owns every task's state for a single workflow run. State
//! is read by cloning it out under a short lock rather than handing back a
//! reference, the same snapshot discipline the probe registry uses for its
//! probe list — callers never observe a half-mutated `TaskStatus`.

use crate::error::{WorkflowError, WorkflowResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Instant;
use voyager_core::TaskId;

/// A task's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Scheduled,
    Running,
    Succeeded,
    Retrying,
    Escalated,
}

impl TaskState {
    pub fn label(&self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::Scheduled => "Scheduled",
            TaskState::Running => "Running",
            TaskState::Succeeded => "Succeeded",
            TaskState::Retrying => "Retrying",
            TaskState::Escalated => "Escalated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Escalated)
    }
}

/// Mutable per-task record owned by the `Reconciler`.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub updated_at: Instant,
}

impl TaskStatus {
    fn new() -> Self {
        Self {
            state: TaskState::Pending,
            retry_count: 0,
            last_error: None,
            updated_at: Instant::now(),
        }
    }
}

/// Why a running task was forced to a terminal state by cooperative
/// cancellation, rather than by its own retry budget. Distinguishing these
/// lets a `WorkflowOutcome` consumer tell a workflow-timeout escalation
/// apart from a fail-fast or externally cancelled one (`spec.md` §4.3/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    FailFast,
    Timeout,
    External,
}

impl CancelCause {
    fn error_message(&self) -> &'static str {
        match self {
            CancelCause::Timeout => "TimeoutExceeded",
            CancelCause::FailFast | CancelCause::External => "Cancelled",
        }
    }
}

/// Events a task can be driven through. Each is valid from exactly one
/// source state (see the table in `spec.md` §4.2).
#[derive(Debug, Clone, Copy)]
pub enum Transition {
    Schedule,
    Start,
    Succeed,
    /// Failed with retries remaining: Running -> Retrying.
    FailRetryable,
    /// Failed with retries exhausted: Running -> Escalated.
    FailTerminal,
    Retry,
}

impl Transition {
    fn apply(self, state: TaskState) -> Option<TaskState> {
        use TaskState::*;
        use Transition::*;
        match (self, state) {
            (Schedule, Pending) => Some(Scheduled),
            (Start, Scheduled) => Some(Running),
            (Succeed, Running) => Some(Succeeded),
            (FailRetryable, Running) => Some(Retrying),
            (FailTerminal, Running) => Some(Escalated),
            (Retry, Retrying) => Some(Running),
            _ => None,
        }
    }
}

/// The state-machine authority for one workflow run's tasks.
pub struct Reconciler {
    tasks: RwLock<HashMap<TaskId, TaskStatus>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `task_id` in `Pending`. Re-registering an existing task
    /// resets it, used only when a workflow run is retried from scratch.
    pub fn register(&self, task_id: TaskId) {
        self.tasks.write().insert(task_id, TaskStatus::new());
    }

    /// Returns a snapshot of the task's current status.
    pub fn status(&self, task_id: &TaskId) -> WorkflowResult<TaskStatus> {
        self.tasks
            .read()
            .get(task_id)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownTask(task_id.clone()))
    }

    /// Applies `transition` to `task_id`, returning the resulting state.
    pub fn transition(
        &self,
        task_id: &TaskId,
        transition: Transition,
    ) -> WorkflowResult<TaskState> {
        let mut tasks = self.tasks.write();
        let status = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::UnknownTask(task_id.clone()))?;

        let from = status.state;
        let to = transition
            .apply(from)
            .ok_or_else(|| WorkflowError::InvalidTransition {
                task: task_id.clone(),
                from: from.label(),
                to: transition_target_label(transition),
            })?;

        status.state = to;
        status.updated_at = Instant::now();
        Ok(to)
    }

    /// Records a failure and transitions to `Retrying` or `Escalated`
    /// depending on whether `retry_count < max_retries` after incrementing.
    pub fn fail(
        &self,
        task_id: &TaskId,
        error: impl Into<String>,
        max_retries: u32,
    ) -> WorkflowResult<TaskState> {
        let mut tasks = self.tasks.write();
        let status = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::UnknownTask(task_id.clone()))?;

        if status.state != TaskState::Running {
            return Err(WorkflowError::InvalidTransition {
                task: task_id.clone(),
                from: status.state.label(),
                to: "Retrying|Escalated",
            });
        }

        status.last_error = Some(error.into());
        let to = if status.retry_count < max_retries {
            status.retry_count += 1;
            TaskState::Retrying
        } else {
            TaskState::Escalated
        };
        status.state = to;
        status.updated_at = Instant::now();
        Ok(to)
    }

    /// Forces a running task straight to `Escalated`, bypassing the retry
    /// budget entirely — cooperative cancellation never retries. The
    /// recorded error reflects `cause` so a timeout-driven escalation reads
    /// differently from a fail-fast or externally cancelled one.
    pub fn cancel(&self, task_id: &TaskId, cause: CancelCause) -> WorkflowResult<TaskState> {
        let mut tasks = self.tasks.write();
        let status = tasks
            .get_mut(task_id)
            .ok_or_else(|| WorkflowError::UnknownTask(task_id.clone()))?;

        if status.state.is_terminal() {
            return Ok(status.state);
        }

        status.last_error = Some(cause.error_message().to_string());
        status.state = TaskState::Escalated;
        status.updated_at = Instant::now();
        Ok(TaskState::Escalated)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn transition_target_label(transition: Transition) -> &'static str {
    match transition {
        Transition::Schedule => "Scheduled",
        Transition::Start => "Running",
        Transition::Succeed => "Succeeded",
        Transition::FailRetryable => "Retrying",
        Transition::FailTerminal => "Escalated",
        Transition::Retry => "Running",
    }
}
