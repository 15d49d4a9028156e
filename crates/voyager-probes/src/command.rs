//! Wire shape for commands delivered on the `instrument-commands` topic.
//!
//! Parsing them off a file or a message broker is out of scope here; only
//! the `Deserialize` impl and the dispatch against an `Embedder` are, since
//! those are the data model rather than the I/O plumbing around it.

use crate::error::ProbeOutcome;
use crate::registry::Embedder;
use serde::Deserialize;
use tracing::warn;

/// The `action` field is kept as a plain string rather than a closed enum:
/// the wire contract calls for unrecognized actions to be logged and
/// ignored, not rejected at parse time, unlike the tagged `Step` enum's
/// strict `type` discriminator.
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(rename = "instrumentId")]
    pub instrument_id: String,
    pub payload: Option<serde_json::Value>,
}

impl Embedder {
    /// Applies a command to this registry. `reload`/`update_config` have no
    /// defined effect on a registry that holds live closures rather than
    /// declarative config, so they are logged and ignored, same as any
    /// unrecognized action.
    pub fn apply_command(&self, command: &Command) -> ProbeOutcome<()> {
        let id = crate::probe::ProbeId::new(&command.instrument_id);
        match command.action.as_str() {
            "enable" => self.enable(&id),
            "disable" => self.disable(&id),
            "reload" | "update_config" => {
                warn!(action = %command.action, instrument = %id, "command has no effect on this registry");
                Ok(())
            }
            other => {
                warn!(action = other, instrument = %id, "unrecognized instrument command action");
                Ok(())
            }
        }
    }
}
