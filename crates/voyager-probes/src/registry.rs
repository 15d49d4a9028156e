//! The probe registry: copy-on-write snapshot reads, a per-probe last-result
//! cache, and severity-based event publication.

use crate::alert::escalate;
use crate::error::{ProbeError, ProbeOutcome};
use crate::phase::Phase;
use crate::probe::{ProbeContext, ProbeId, ProbeResult};
use crate::Probe;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use voyager_events::{Event, Producer};

/// Holds every registered probe and the last result produced by each.
/// `fire_phase` clones the current `Arc<Vec<Probe>>` snapshot under a short
/// lock and then iterates the clone without holding the lock, so
/// concurrent `register`/`unregister` never blocks or races with an
/// in-flight fire.
pub struct Embedder {
    probes: RwLock<Arc<Vec<Probe>>>,
    last_results: DashMap<ProbeId, ProbeResult>,
    producer: Arc<Producer>,
    source: String,
}

impl Embedder {
    pub fn new(producer: Arc<Producer>, source: impl Into<String>) -> Self {
        Self {
            probes: RwLock::new(Arc::new(Vec::new())),
            last_results: DashMap::new(),
            producer,
            source: source.into(),
        }
    }

    pub fn register(&self, probe: Probe) {
        let mut probes = self.probes.write();
        let mut next = (**probes).clone();
        next.retain(|p| p.id != probe.id);
        next.push(probe);
        next.sort_by_key(|p| p.priority);
        *probes = Arc::new(next);
    }

    pub fn unregister(&self, id: &ProbeId) {
        let mut probes = self.probes.write();
        let mut next = (**probes).clone();
        next.retain(|p| &p.id != id);
        *probes = Arc::new(next);
        self.last_results.remove(id);
    }

    pub fn enable(&self, id: &ProbeId) -> ProbeOutcome<()> {
        self.set_enabled(id, true)
    }

    pub fn disable(&self, id: &ProbeId) -> ProbeOutcome<()> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &ProbeId, enabled: bool) -> ProbeOutcome<()> {
        let mut probes = self.probes.write();
        let mut next = (**probes).clone();
        let found = next.iter_mut().find(|p| &p.id == id);
        match found {
            Some(probe) => {
                probe.enabled = enabled;
                *probes = Arc::new(next);
                Ok(())
            }
            None => Err(ProbeError::UnknownProbe(id.to_string())),
        }
    }

    /// Fires every enabled probe whose phase matches `phase` (or is
    /// `Continuous`), filtered by action type, in ascending priority order.
    /// Each probe's failure is isolated: logged, and does not prevent the
    /// remaining probes from firing. Successful results are cached and
    /// published as events.
    pub async fn fire_phase(
        &self,
        phase: Phase,
        session_id: voyager_core::SessionId,
        task_id: Option<voyager_core::TaskId>,
        action_type: Option<String>,
        page: Arc<dyn voyager_core::BrowserPage>,
    ) -> Vec<ProbeResult> {
        let snapshot = self.probes.read().clone();
        let mut results = Vec::new();

        for probe in snapshot.iter() {
            if !probe.enabled || !probe.matches(phase, action_type.as_deref()) {
                continue;
            }

            let previous_result = self
                .last_results
                .get(&probe.id)
                .map(|entry| entry.value().clone());

            let ctx = ProbeContext {
                page: Arc::clone(&page),
                session_id: session_id.clone(),
                task_id: task_id.clone(),
                action_type: action_type.clone(),
                previous_result,
            };

            match (probe.measure)(ctx).await {
                Ok(mut result) => {
                    result.severity = escalate(result.severity, &result.values, &probe.alert_conditions);
                    self.last_results.insert(probe.id.clone(), result.clone());
                    self.publish(&result, &session_id, task_id.as_ref());
                    results.push(result);
                }
                Err(err) => {
                    warn!(probe = %probe.id, error = %err, "probe measurement failed");
                }
            }
        }

        results
    }

    fn publish(
        &self,
        result: &ProbeResult,
        session_id: &voyager_core::SessionId,
        task_id: Option<&voyager_core::TaskId>,
    ) {
        let event_type = if result.severity.is_alerting() {
            "instrument.alert"
        } else {
            "instrument.measurement"
        };

        let payload: HashMap<String, serde_json::Value> = result
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut event = Event::new(event_type, self.source.clone())
            .with_session(session_id.clone())
            .with_payload(payload);
        if let Some(task_id) = task_id {
            event = event.with_task(task_id.clone());
        }

        debug!(probe = %result.instrument_id, severity = ?result.severity, "publishing probe result");
        Arc::clone(&self.producer).emit(event);
    }

    /// Runs every probe's teardown, then clears the last-result cache.
    /// Called once on embedder shutdown.
    pub fn teardown_all(&self) {
        let snapshot = self.probes.read().clone();
        for probe in snapshot.iter() {
            if let Some(teardown) = &probe.teardown {
                teardown();
            }
        }
        self.last_results.clear();
    }

    #[cfg(test)]
    pub fn last_result(&self, id: &ProbeId) -> Option<ProbeResult> {
        self.last_results.get(id).map(|e| e.value().clone())
    }

    #[cfg(test)]
    pub fn cache_len(&self) -> usize {
        self.last_results.len()
    }
}
