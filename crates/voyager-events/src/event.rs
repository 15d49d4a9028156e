//! The event record routed across the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use voyager_core::{EventId, SessionId, TaskId};

/// Distributed-tracing correlation carried alongside an event, mirroring
/// this codebase's causation/correlation id pairing but scoped to a single
/// trace rather than an aggregate's command history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    #[serde(rename = "traceId")]
    pub trace_id: String,
    #[serde(rename = "spanId")]
    pub span_id: String,
}

/// An immutable, routable observability or lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<SessionId>,
    #[serde(rename = "taskId", skip_serializing_if = "Option::is_none", default)]
    pub task_id: Option<TaskId>,
    pub timestamp: DateTime<Utc>,
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(
        rename = "traceContext",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub trace_context: Option<TraceContext>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            source: source.into(),
            session_id: None,
            task_id: None,
            timestamp: Utc::now(),
            payload: HashMap::new(),
            trace_context: None,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_payload(mut self, payload: HashMap<String, serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace_context = Some(trace);
        self
    }

    /// The transport partition key: the session id, or the event id if the
    /// event has no session (e.g. `workflow.started`).
    pub fn partition_key(&self) -> String {
        match &self.session_id {
            Some(session) => session.as_str().to_string(),
            None => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_key_prefers_session_id() {
        let event = Event::new("task.transition", "runner").with_session(SessionId::from("s1"));
        assert_eq!(event.partition_key(), "s1");
    }

    #[test]
    fn partition_key_falls_back_to_event_id() {
        let event = Event::new("workflow.started", "runner");
        assert_eq!(event.partition_key(), event.id.to_string());
    }
}
