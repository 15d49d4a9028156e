//! Probe definitions and the measurement record they produce.

use crate::alert::{AlertCondition, Severity};
use crate::error::ProbeError;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use voyager_core::{BrowserPage, SessionId, TaskId};

/// A probe's identity, unique within the embedder's registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProbeId(String);

impl ProbeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProbeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque context handed to a probe's `measure` function: the browser
/// handle, the owning session, the task (if any) the phase fired from, and
/// the action type used for `actionFilter` matching.
pub struct ProbeContext {
    pub page: Arc<dyn BrowserPage>,
    pub session_id: SessionId,
    pub task_id: Option<TaskId>,
    pub action_type: Option<String>,
    pub previous_result: Option<ProbeResult>,
}

/// Immutable record produced by one probe invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub instrument_id: ProbeId,
    pub timestamp: DateTime<Utc>,
    pub values: HashMap<String, serde_json::Value>,
    pub severity: Severity,
    pub tags: HashMap<String, String>,
}

impl ProbeResult {
    pub fn new(instrument_id: ProbeId, values: HashMap<String, serde_json::Value>) -> Self {
        Self {
            instrument_id,
            timestamp: Utc::now(),
            values,
            severity: Severity::Trace,
            tags: HashMap::new(),
        }
    }

    pub fn with_tags(mut self, tags: HashMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

pub type MeasureFn =
    Arc<dyn Fn(ProbeContext) -> BoxFuture<'static, Result<ProbeResult, ProbeError>> + Send + Sync>;
pub type TeardownFn = Arc<dyn Fn() + Send + Sync>;

/// A measurement attached to a lifecycle phase. Held by the `Embedder`'s
/// registry for its lifetime; `teardown` runs once, on `teardown_all`.
#[derive(Clone)]
pub struct Probe {
    pub id: ProbeId,
    pub name: String,
    pub kind: String,
    pub phase: Phase,
    pub action_filter: HashSet<String>,
    pub enabled: bool,
    pub priority: i32,
    pub alert_conditions: Vec<AlertCondition>,
    pub measure: MeasureFn,
    pub teardown: Option<TeardownFn>,
}

impl Probe {
    pub fn new(id: impl Into<ProbeId>, phase: Phase, measure: MeasureFn) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: String::new(),
            phase,
            action_filter: HashSet::new(),
            enabled: true,
            priority: 0,
            alert_conditions: Vec::new(),
            measure,
            teardown: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action_filter(mut self, actions: impl IntoIterator<Item = String>) -> Self {
        self.action_filter = actions.into_iter().collect();
        self
    }

    pub fn with_alert_conditions(mut self, conditions: Vec<AlertCondition>) -> Self {
        self.alert_conditions = conditions;
        self
    }

    pub fn with_teardown(mut self, teardown: TeardownFn) -> Self {
        self.teardown = Some(teardown);
        self
    }

    /// Whether this probe is eligible to fire for `fired_phase` and
    /// `action_type`, independent of `enabled` (checked separately by the
    /// registry so disabled probes can still be inspected).
    pub fn matches(&self, fired_phase: Phase, action_type: Option<&str>) -> bool {
        if !self.phase.matches(fired_phase) {
            return false;
        }
        if self.action_filter.is_empty() {
            return true;
        }
        match action_type {
            Some(action) => self.action_filter.contains(action),
            None => false,
        }
    }
}
