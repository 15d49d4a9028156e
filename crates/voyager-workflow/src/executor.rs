//! The workflow runner: the top-level coordinator that consumes scheduler
//! batches, drives tasks concurrently under a concurrency cap, runs each
//! task's steps through the step executor, drives reconciler transitions,
//! applies retry/backoff, enforces timeouts, and emits lifecycle events.

use crate::dag::{plan, Task, Workflow};
use crate::error::{WorkflowError, WorkflowResult};
use crate::outcome::{TaskOutcome, WorkflowOutcome, WorkflowStatus};
use crate::state::{CancelCause, Reconciler, TaskState, Transition};
use crate::step_executor::execute_step;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use voyager_core::{BrowserPage, SessionId, TaskId};
use voyager_events::{Event, Producer};
use voyager_probes::{Embedder, Phase};

/// Everything a single task's execution routine needs, besides the task
/// definition itself.
struct TaskRunCtx {
    page: Arc<dyn BrowserPage>,
    producer: Arc<Producer>,
    embedder: Option<Arc<Embedder>>,
    reconciler: Arc<Reconciler>,
    cancel: CancellationToken,
    /// Set once, right before `cancel` is triggered, so every task routine
    /// that observes the cancellation can record why it was cancelled.
    cancel_cause: Arc<Mutex<Option<CancelCause>>>,
    fail_fast_triggered: Arc<AtomicBool>,
    session_id: SessionId,
}

/// Marks `ctx` as cancelled for `cause`, unless something else already
/// claimed the cancellation (first cause wins).
fn trigger_cancel(ctx: &TaskRunCtx, cause: CancelCause) {
    let mut guard = ctx.cancel_cause.lock();
    if guard.is_none() {
        *guard = Some(cause);
    }
    ctx.cancel.cancel();
}

/// Consumes a `Workflow` definition and drives it to completion.
pub struct WorkflowRunner {
    workflow: Workflow,
    page: Arc<dyn BrowserPage>,
    producer: Arc<Producer>,
    embedder: Option<Arc<Embedder>>,
    session_id: SessionId,
}

impl WorkflowRunner {
    pub fn new(
        workflow: Workflow,
        page: Arc<dyn BrowserPage>,
        producer: Arc<Producer>,
        session_id: SessionId,
    ) -> Self {
        Self {
            workflow,
            page,
            producer,
            embedder: None,
            session_id,
        }
    }

    pub fn with_embedder(mut self, embedder: Arc<Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Runs the workflow to completion. Only workflow-fatal errors
    /// (malformed definition, cycle, internal invariant violation) escape
    /// as `Err` — step failures are consumed in-band and reflected in the
    /// returned `WorkflowOutcome`.
    pub async fn run(&self) -> WorkflowResult<WorkflowOutcome> {
        let batches = plan(&self.workflow)?;

        let reconciler = Arc::new(Reconciler::new());
        for task in &self.workflow.tasks {
            reconciler.register(task.name.clone());
        }

        self.emit_lifecycle("workflow.started", None, HashMap::new());

        let cancel = CancellationToken::new();
        let cancel_cause = Arc::new(Mutex::new(None));
        let fail_fast_triggered = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(self.workflow.policy.max_concurrent_tasks.max(1)));

        let ctx = Arc::new(TaskRunCtx {
            page: Arc::clone(&self.page),
            producer: Arc::clone(&self.producer),
            embedder: self.embedder.clone(),
            reconciler: Arc::clone(&reconciler),
            cancel: cancel.clone(),
            cancel_cause: Arc::clone(&cancel_cause),
            fail_fast_triggered: Arc::clone(&fail_fast_triggered),
            session_id: self.session_id.clone(),
        });

        let tasks_by_batch: Vec<Vec<Task>> = batches
            .iter()
            .map(|batch| {
                batch
                    .iter()
                    .map(|id| {
                        self.workflow
                            .task(id)
                            .expect("scheduler only emits defined tasks")
                            .clone()
                    })
                    .collect()
            })
            .collect();
        let fail_fast = self.workflow.policy.fail_fast;

        // Spawned rather than awaited inline so that, on timeout, we can
        // drop only the *waiting*, not the task routines themselves: they
        // keep running as independent tokio tasks and we await the same
        // handle again below until every one of them reaches a terminal
        // state, instead of racing ahead to build the outcome immediately.
        let mut run_handle = tokio::spawn(run_batches(tasks_by_batch, fail_fast, Arc::clone(&ctx), semaphore));

        let timed_out = match self.workflow.policy.timeout_ms {
            Some(timeout_ms) => {
                tokio::select! {
                    result = &mut run_handle => {
                        result.expect("run_batches task panicked");
                        false
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_millis(timeout_ms)) => {
                        trigger_cancel(&ctx, CancelCause::Timeout);
                        (&mut run_handle)
                            .await
                            .expect("run_batches task panicked");
                        true
                    }
                }
            }
            None => {
                run_handle.await.expect("run_batches task panicked");
                false
            }
        };

        let tasks: Vec<TaskOutcome> = self
            .workflow
            .tasks
            .iter()
            .map(|task| {
                let status = reconciler
                    .status(&task.name)
                    .expect("every task was registered before run");
                TaskOutcome {
                    task: task.name.clone(),
                    state: status.state,
                    retry_count: status.retry_count,
                    last_error: status.last_error,
                }
            })
            .collect();

        let errors: Vec<String> = tasks
            .iter()
            .filter_map(|t| t.last_error.clone())
            .collect();

        let status = if timed_out {
            WorkflowStatus::TimedOut
        } else if fail_fast_triggered.load(Ordering::SeqCst) {
            WorkflowStatus::FailedFast
        } else if tasks.iter().any(|t| t.state == TaskState::Escalated) {
            WorkflowStatus::Escalated
        } else {
            WorkflowStatus::Succeeded
        };

        let outcome = WorkflowOutcome {
            workflow: self.workflow.name.clone(),
            status,
            tasks,
            errors,
        };

        let mut finished_payload = HashMap::new();
        finished_payload.insert(
            "success".to_string(),
            serde_json::json!(matches!(outcome.status, WorkflowStatus::Succeeded)),
        );
        self.emit_lifecycle("workflow.finished", None, finished_payload);

        Ok(outcome)
    }

    fn emit_lifecycle(
        &self,
        event_type: &str,
        task_id: Option<&TaskId>,
        payload: HashMap<String, serde_json::Value>,
    ) {
        let mut event = Event::new(event_type, "workflow-runner")
            .with_session(self.session_id.clone())
            .with_payload(payload);
        if let Some(task_id) = task_id {
            event = event.with_task(task_id.clone());
        }
        Arc::clone(&self.producer).emit(event);
    }
}

/// Runs every batch in order, bounded by `semaphore`, spawning one task
/// routine per task and waiting for the whole batch before moving to the
/// next (the batch barrier). A free function rather than a method so it
/// can be `tokio::spawn`ed as a single unit and raced against a workflow
/// timeout without losing the handle to the in-flight task routines.
async fn run_batches(
    batches: Vec<Vec<Task>>,
    fail_fast: bool,
    ctx: Arc<TaskRunCtx>,
    semaphore: Arc<Semaphore>,
) {
    for batch in batches {
        if ctx.cancel.is_cancelled() {
            let cause = (*ctx.cancel_cause.lock()).unwrap_or(CancelCause::External);
            for task in &batch {
                let _ = ctx.reconciler.cancel(&task.name, cause);
            }
            continue;
        }

        let mut handles = Vec::with_capacity(batch.len());
        for task in batch {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let ctx = Arc::clone(&ctx);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let state = run_task(&task, &ctx).await;
                if fail_fast && state == TaskState::Escalated {
                    ctx.fail_fast_triggered.store(true, Ordering::SeqCst);
                    trigger_cancel(&ctx, CancelCause::FailFast);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Drives one task from `Scheduled` through to a terminal state, applying
/// retry/backoff on step failure and honoring cooperative cancellation.
/// Returns the task's final state.
async fn run_task(task: &Task, ctx: &TaskRunCtx) -> TaskState {
    if transition_and_emit(ctx, &task.name, Transition::Schedule).is_err() {
        return ctx
            .reconciler
            .status(&task.name)
            .map(|s| s.state)
            .unwrap_or(TaskState::Escalated);
    }
    let _ = transition_and_emit(ctx, &task.name, Transition::Start);

    loop {
        if ctx.cancel.is_cancelled() {
            return cancel_task(ctx, &task.name);
        }

        fire_phase(ctx, Phase::BeforeAction, Some(&task.name)).await;

        let mut failure: Option<String> = None;
        for step in &task.steps {
            if ctx.cancel.is_cancelled() {
                break;
            }

            if matches!(step, voyager_core::Step::Navigate { .. }) {
                fire_phase(ctx, Phase::OnNavigation, Some(&task.name)).await;
            }

            let result = execute_step(ctx.page.as_ref(), step).await;
            emit_step_completed(ctx, &task.name, &result);

            if !result.success {
                failure = Some(result.error.unwrap_or_else(|| "step failed".to_string()));
                fire_phase(ctx, Phase::OnError, Some(&task.name)).await;
                break;
            }
        }

        fire_phase(ctx, Phase::AfterAction, Some(&task.name)).await;

        if ctx.cancel.is_cancelled() {
            return cancel_task(ctx, &task.name);
        }

        match failure {
            None => {
                let _ = ctx.reconciler.transition(&task.name, Transition::Succeed);
                emit_transition(ctx, &task.name, TaskState::Succeeded);
                return TaskState::Succeeded;
            }
            Some(error) => {
                let state = match ctx
                    .reconciler
                    .fail(&task.name, error, task.retry.max_retries)
                {
                    Ok(state) => state,
                    Err(_) => return TaskState::Escalated,
                };
                emit_transition(ctx, &task.name, state);

                if state == TaskState::Escalated {
                    return TaskState::Escalated;
                }

                let attempt_index = ctx
                    .reconciler
                    .status(&task.name)
                    .map(|s| s.retry_count.saturating_sub(1))
                    .unwrap_or(0);
                let delay = task.retry.delay_for_attempt(attempt_index);

                let mut retry_payload = HashMap::new();
                retry_payload.insert("attempt".to_string(), serde_json::json!(attempt_index));
                retry_payload.insert(
                    "backoffMs".to_string(),
                    serde_json::json!(delay.as_millis() as u64),
                );
                emit_event(ctx, "task.retry", Some(&task.name), retry_payload);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = ctx.cancel.cancelled() => {}
                }

                let _ = ctx.reconciler.transition(&task.name, Transition::Retry);
                emit_transition(ctx, &task.name, TaskState::Running);
            }
        }
    }
}

/// Forces `task_id` to `Escalated` via the reconciler, tagging the recorded
/// error with whichever `CancelCause` was set when cancellation fired, and
/// emits the resulting transition.
fn cancel_task(ctx: &TaskRunCtx, task_id: &TaskId) -> TaskState {
    let cause = (*ctx.cancel_cause.lock()).unwrap_or(CancelCause::External);
    let state = ctx
        .reconciler
        .cancel(task_id, cause)
        .unwrap_or(TaskState::Escalated);
    emit_transition(ctx, task_id, state);
    state
}

async fn fire_phase(ctx: &TaskRunCtx, phase: Phase, task_id: Option<&TaskId>) {
    if let Some(embedder) = &ctx.embedder {
        embedder
            .fire_phase(
                phase,
                ctx.session_id.clone(),
                task_id.cloned(),
                None,
                Arc::clone(&ctx.page),
            )
            .await;
    }
}

fn transition_and_emit(
    ctx: &TaskRunCtx,
    task_id: &TaskId,
    transition: Transition,
) -> WorkflowResult<TaskState> {
    let state = ctx.reconciler.transition(task_id, transition)?;
    emit_transition(ctx, task_id, state);
    Ok(state)
}

fn emit_transition(ctx: &TaskRunCtx, task_id: &TaskId, state: TaskState) {
    debug!(task = %task_id, state = state.label(), "task transition");
    let mut payload = HashMap::new();
    payload.insert("state".to_string(), serde_json::json!(state.label()));
    emit_event(ctx, "task.transition", Some(task_id), payload);
}

fn emit_step_completed(ctx: &TaskRunCtx, task_id: &TaskId, result: &voyager_core::StepResult) {
    let mut payload = HashMap::new();
    payload.insert("stepKind".to_string(), serde_json::json!(result.step_kind));
    payload.insert("success".to_string(), serde_json::json!(result.success));
    payload.insert(
        "durationMs".to_string(),
        serde_json::json!(result.duration_ms),
    );
    if let Some(error) = &result.error {
        payload.insert("error".to_string(), serde_json::json!(error));
    }
    emit_event(ctx, "step.completed", Some(task_id), payload);
}

fn emit_event(
    ctx: &TaskRunCtx,
    event_type: &str,
    task_id: Option<&TaskId>,
    payload: HashMap<String, serde_json::Value>,
) {
    let mut event = Event::new(event_type, "workflow-runner")
        .with_session(ctx.session_id.clone())
        .with_payload(payload);
    if let Some(task_id) = task_id {
        event = event.with_task(task_id.clone());
    }
    Arc::clone(&ctx.producer).emit(event);
    info!(event_type, "lifecycle event emitted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{OutputSpec, Task, Workflow, WorkflowPolicy};
    use crate::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use voyager_core::{BrowserError, Step};
    use voyager_events::{FakeTransport, ProducerConfig};

    struct FlakyPage {
        navigate_failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl BrowserPage for FlakyPage {
        async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
            let remaining = self.navigate_failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.navigate_failures_remaining
                    .store(remaining - 1, Ordering::SeqCst);
                Err(BrowserError::NavigationFailed("flaky".into()))
            } else {
                Ok(())
            }
        }
        async fn wait_for(&self, _selector: &str, _timeout_ms: u64) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn click(&self, _selector: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn read_attribute(
            &self,
            _selector: &str,
            _attribute: &str,
        ) -> Result<Option<String>, BrowserError> {
            Ok(None)
        }
        async fn read_inner_text(&self, _selector: &str) -> Result<Option<String>, BrowserError> {
            Ok(None)
        }
    }

    fn nav_task(name: &str, deps: &[&str]) -> Task {
        Task::new(
            name,
            vec![Step::Navigate {
                url: "https://example.com".into(),
            }],
        )
        .depends_on(deps.iter().map(|d| TaskId::from(*d)))
    }

    fn output() -> OutputSpec {
        OutputSpec {
            store_as: String::new(),
            format: "json".into(),
        }
    }

    #[tokio::test]
    async fn diamond_workflow_completes_all_tasks() {
        let workflow = Workflow::new(
            "diamond",
            vec![
                nav_task("A", &[]),
                nav_task("B", &["A"]),
                nav_task("C", &["A"]),
                nav_task("D", &["B", "C"]),
            ],
        )
        .with_policy(WorkflowPolicy {
            max_concurrent_tasks: 2,
            timeout_ms: None,
            fail_fast: false,
        });

        let page = Arc::new(FlakyPage {
            navigate_failures_remaining: AtomicU32::new(0),
        });
        let producer = Producer::new(ProducerConfig::default(), Arc::new(FakeTransport::new()));
        let runner = WorkflowRunner::new(workflow, page, producer, SessionId::from("s1"));

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Succeeded);
        assert!(outcome
            .tasks
            .iter()
            .all(|t| t.state == TaskState::Succeeded));
        let _ = output();
    }

    #[tokio::test]
    async fn retry_then_succeed_reaches_succeeded_with_retry_count_one() {
        let mut task = nav_task("A", &[]);
        task.retry = RetryPolicy::new(1, 5);
        let workflow = Workflow::new("retry", vec![task]);

        let page = Arc::new(FlakyPage {
            navigate_failures_remaining: AtomicU32::new(1),
        });
        let producer = Producer::new(ProducerConfig::default(), Arc::new(FakeTransport::new()));
        let runner = WorkflowRunner::new(workflow, page, producer, SessionId::from("s1"));

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Succeeded);
        assert_eq!(outcome.tasks[0].retry_count, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_escalate_the_workflow() {
        let mut task = nav_task("A", &[]);
        task.retry = RetryPolicy::new(1, 5);
        let workflow = Workflow::new("retry-exhausted", vec![task]);

        let page = Arc::new(FlakyPage {
            navigate_failures_remaining: AtomicU32::new(5),
        });
        let producer = Producer::new(ProducerConfig::default(), Arc::new(FakeTransport::new()));
        let runner = WorkflowRunner::new(workflow, page, producer, SessionId::from("s1"));

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::Escalated);
        assert_eq!(outcome.tasks[0].state, TaskState::Escalated);
        assert_eq!(outcome.tasks[0].retry_count, 1);
    }

    #[tokio::test]
    async fn fail_fast_cancels_sibling_tasks() {
        let mut a = nav_task("A", &[]);
        a.retry = RetryPolicy::new(0, 0);
        let b = nav_task("B", &[]);
        let workflow = Workflow::new("fail-fast", vec![a, b]).with_policy(WorkflowPolicy {
            max_concurrent_tasks: 2,
            timeout_ms: None,
            fail_fast: true,
        });

        let page = Arc::new(FlakyPage {
            navigate_failures_remaining: AtomicU32::new(u32::MAX),
        });
        let producer = Producer::new(ProducerConfig::default(), Arc::new(FakeTransport::new()));
        let runner = WorkflowRunner::new(workflow, page, producer, SessionId::from("s1"));

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome.status, WorkflowStatus::FailedFast);
        let b = outcome.tasks.iter().find(|t| t.task == TaskId::from("B")).unwrap();
        assert_eq!(b.state, TaskState::Escalated);
    }

    struct SlowPage;

    #[async_trait]
    impl BrowserPage for SlowPage {
        async fn navigate(&self, _url: &str) -> Result<(), BrowserError> {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            Ok(())
        }
        async fn wait_for(&self, _selector: &str, _timeout_ms: u64) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn click(&self, _selector: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn read_attribute(
            &self,
            _selector: &str,
            _attribute: &str,
        ) -> Result<Option<String>, BrowserError> {
            Ok(None)
        }
        async fn read_inner_text(&self, _selector: &str) -> Result<Option<String>, BrowserError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn workflow_timeout_waits_for_the_inflight_task_to_escalate() {
        let workflow = Workflow::new("slow", vec![nav_task("A", &[])]).with_policy(WorkflowPolicy {
            max_concurrent_tasks: 1,
            timeout_ms: Some(20),
            fail_fast: false,
        });

        let page = Arc::new(SlowPage);
        let producer = Producer::new(ProducerConfig::default(), Arc::new(FakeTransport::new()));
        let runner = WorkflowRunner::new(workflow, page, producer, SessionId::from("s1"));

        let outcome = runner.run().await.unwrap();

        assert_eq!(outcome.status, WorkflowStatus::TimedOut);
        assert_eq!(outcome.tasks[0].state, TaskState::Escalated);
        assert_eq!(outcome.tasks[0].last_error.as_deref(), Some("TimeoutExceeded"));
    }

    #[tokio::test]
    async fn cycle_is_rejected_before_any_task_runs() {
        let workflow = Workflow::new("cycle", vec![nav_task("A", &["B"]), nav_task("B", &["A"])]);

        let page = Arc::new(FlakyPage {
            navigate_failures_remaining: AtomicU32::new(0),
        });
        let producer = Producer::new(ProducerConfig::default(), Arc::new(FakeTransport::new()));
        let runner = WorkflowRunner::new(workflow, page, producer, SessionId::from("s1"));

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)));
    }
}
