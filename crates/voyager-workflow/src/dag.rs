//! Workflow/Task data model and the dependency scheduler.
//!
//! `plan` is a free function rather than a method on a stateful type —
//! there is no instance state to own, only a pure computation over a
//! `Workflow` definition, the same shape this codebase's closest analogue
//! (`WorkflowDag::topological_sort`) takes, generalized here from a flat
//! order to batches.

use crate::error::{WorkflowError, WorkflowResult};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use voyager_core::{Step, TaskId};

/// Where a task's output should be stored once it completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub store_as: String,
    pub format: String,
}

/// Immutable definition of one task within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: TaskId,
    #[serde(rename = "dependsOn", default)]
    pub depends_on: HashSet<TaskId>,
    pub steps: Vec<Step>,
    pub retry: RetryPolicy,
    pub output: OutputSpec,
    /// Higher values sort earlier within a batch. Does not affect which
    /// batch a task lands in — only iteration order among mutually
    /// independent tasks that become ready at the same time.
    #[serde(default)]
    pub priority: i32,
}

impl Task {
    pub fn new(name: impl Into<TaskId>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            depends_on: HashSet::new(),
            steps,
            retry: RetryPolicy::default(),
            output: OutputSpec {
                store_as: String::new(),
                format: "json".to_string(),
            },
            priority: 0,
        }
    }

    pub fn depends_on(mut self, names: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on = names.into_iter().collect();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Concurrency, timeout, and fail-fast policy for a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    #[serde(rename = "maxConcurrentTasks")]
    pub max_concurrent_tasks: usize,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    #[serde(rename = "failFast", default)]
    pub fail_fast: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            timeout_ms: None,
            fail_fast: false,
        }
    }
}

/// A named, acyclic graph of tasks with a shared execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub tasks: Vec<Task>,
    pub policy: WorkflowPolicy,
}

impl Workflow {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            name: name.into(),
            tasks,
            policy: WorkflowPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: WorkflowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn task(&self, name: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.name == name)
    }

    /// Validates that every `dependsOn` entry names a defined task and that
    /// task names are unique. Does not check for cycles — `plan` does that
    /// as part of computing batches.
    pub fn validate_definition(&self) -> WorkflowResult<()> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(&task.name) {
                return Err(WorkflowError::ParseError(format!(
                    "duplicate task name: {}",
                    task.name
                )));
            }
        }

        let known: HashSet<&TaskId> = self.tasks.iter().map(|t| &t.name).collect();
        for task in &self.tasks {
            for dep in &task.depends_on {
                if !known.contains(dep) {
                    return Err(WorkflowError::ParseError(format!(
                        "task {} depends on undefined task {}",
                        task.name, dep
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A maximal set of tasks whose dependencies are all satisfied by earlier
/// batches. Definition order is preserved within a batch for determinism;
/// the contract does not require any particular order (§4.1).
pub type Batch = Vec<TaskId>;

/// Computes an ordered sequence of batches for `workflow`.
///
/// Guarantees (mirrors `spec.md` §4.1):
/// 1. Every task in batch *i* has all `dependsOn` entries in batches `< i`.
/// 2. The concatenation of batches contains every task exactly once.
/// 3. Tasks within a batch are mutually independent.
pub fn plan(workflow: &Workflow) -> WorkflowResult<Vec<Batch>> {
    workflow.validate_definition()?;

    let mut undone: VecDeque<&Task> = workflow.tasks.iter().collect();
    let mut completed: HashSet<&TaskId> = HashSet::new();
    let mut batches = Vec::new();

    while !undone.is_empty() {
        let mut batch = Vec::new();
        let mut remaining = VecDeque::new();

        for task in undone {
            if task.depends_on.iter().all(|dep| completed.contains(dep)) {
                batch.push(task);
            } else {
                remaining.push_back(task);
            }
        }

        if batch.is_empty() {
            let participants = remaining.iter().map(|t| t.name.clone()).collect();
            return Err(WorkflowError::CycleDetected(participants));
        }

        // Stable sort: ties (equal priority, including the all-default case)
        // keep definition order.
        batch.sort_by_key(|t| std::cmp::Reverse(t.priority));

        for task in &batch {
            completed.insert(&task.name);
        }
        batches.push(batch.iter().map(|t| t.name.clone()).collect());
        undone = remaining;
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use voyager_core::Step;

    fn task(name: &str, deps: &[&str]) -> Task {
        Task::new(
            name,
            vec![Step::Navigate {
                url: "https://example.com".into(),
            }],
        )
        .depends_on(deps.iter().map(|d| TaskId::from(*d)))
        .with_retry(RetryPolicy::new(0, 10))
    }

    #[test]
    fn diamond_dependency_yields_three_batches() {
        let workflow = Workflow::new(
            "diamond",
            vec![
                task("A", &[]),
                task("B", &["A"]),
                task("C", &["A"]),
                task("D", &["B", "C"]),
            ],
        );

        let batches = plan(&workflow).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![TaskId::from("A")]);
        let mut second: Vec<String> = batches[1].iter().map(|t| t.to_string()).collect();
        second.sort();
        assert_eq!(second, vec!["B".to_string(), "C".to_string()]);
        assert_eq!(batches[2], vec![TaskId::from("D")]);
    }

    #[test]
    fn cycle_is_detected_and_names_participants() {
        let workflow = Workflow::new("cycle", vec![task("A", &["B"]), task("B", &["A"])]);

        let err = plan(&workflow).unwrap_err();
        match err {
            WorkflowError::CycleDetected(mut participants) => {
                participants.sort_by(|a, b| a.as_str().cmp(b.as_str()));
                assert_eq!(
                    participants,
                    vec![TaskId::from("A"), TaskId::from("B")]
                );
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn undefined_dependency_is_a_parse_error() {
        let workflow = Workflow::new("bad", vec![task("A", &["ghost"])]);
        assert!(matches!(
            plan(&workflow),
            Err(WorkflowError::ParseError(_))
        ));
    }

    #[test]
    fn higher_priority_sorts_earlier_within_a_batch() {
        let workflow = Workflow::new(
            "siblings",
            vec![
                task("low", &[]).with_priority(0),
                task("high", &[]).with_priority(10),
                task("mid", &[]).with_priority(5),
            ],
        );

        let batches = plan(&workflow).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![
                TaskId::from("high"),
                TaskId::from("mid"),
                TaskId::from("low"),
            ]
        );
    }

    #[test]
    fn equal_priority_preserves_definition_order() {
        let workflow = Workflow::new("siblings", vec![task("B", &[]), task("A", &[])]);

        let batches = plan(&workflow).unwrap();
        assert_eq!(batches[0], vec![TaskId::from("B"), TaskId::from("A")]);
    }

    #[test]
    fn every_task_appears_exactly_once_across_batches() {
        let workflow = Workflow::new(
            "linear",
            vec![task("A", &[]), task("B", &["A"]), task("C", &["B"])],
        );
        let batches = plan(&workflow).unwrap();
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 3);
    }

    fn build_task(i: usize, deps: &[usize]) -> Task {
        Task::new(
            format!("t{i}"),
            vec![Step::Navigate {
                url: "https://example.com".into(),
            }],
        )
        .depends_on(deps.iter().map(|d| TaskId::from(format!("t{d}").as_str())))
        .with_retry(RetryPolicy::new(0, 10))
    }

    /// Random lower-triangular dependency graphs: task `i` may only depend
    /// on tasks `j < i`, which rules out cycles by construction and lets
    /// every generated workflow exercise `plan`'s success path.
    fn workflow_strategy() -> impl proptest::strategy::Strategy<Value = Workflow> {
        use proptest::prelude::*;

        (2usize..8).prop_flat_map(|n| {
            let edge_count = n * n.saturating_sub(1) / 2;
            proptest::collection::vec(any::<bool>(), edge_count).prop_map(move |bits| {
                let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n];
                let mut idx = 0;
                for i in 0..n {
                    for j in 0..i {
                        if bits[idx] {
                            deps[i].push(j);
                        }
                        idx += 1;
                    }
                }
                let tasks: Vec<Task> = (0..n).map(|i| build_task(i, &deps[i])).collect();
                Workflow::new("random", tasks)
            })
        })
    }

    proptest::proptest! {
        #[test]
        fn scheduler_never_schedules_a_task_before_its_dependencies(workflow in workflow_strategy()) {
            let batches = plan(&workflow).unwrap();

            let total: usize = batches.iter().map(|b| b.len()).sum();
            proptest::prop_assert_eq!(total, workflow.tasks.len());

            let mut batch_of = std::collections::HashMap::new();
            for (idx, batch) in batches.iter().enumerate() {
                for name in batch {
                    batch_of.insert(name.clone(), idx);
                }
            }
            for t in &workflow.tasks {
                let my_batch = batch_of[&t.name];
                for dep in &t.depends_on {
                    proptest::prop_assert!(batch_of[dep] < my_batch);
                }
            }
        }
    }
}
