//! Lifecycle phases a probe can be attached to.

use serde::{Deserialize, Serialize};

/// The point in a task's execution lifecycle a probe fires at.
/// `Continuous` probes fire regardless of the phase passed to `fire_phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    BeforeAction,
    AfterAction,
    DuringIdle,
    OnNavigation,
    OnError,
    Continuous,
}

impl Phase {
    pub fn matches(&self, fired: Phase) -> bool {
        *self == fired || *self == Phase::Continuous
    }
}
