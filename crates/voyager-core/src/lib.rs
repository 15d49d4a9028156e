//! Shared identifiers, declarative step model, and the browser-handle
//! boundary used by the Voyager workflow engine, probe embedder, and event
//! bus crates.

pub mod browser;
pub mod ids;
pub mod step;

pub use browser::{BrowserError, BrowserPage};
pub use ids::{EventId, SessionId, TaskId, WorkflowId};
pub use step::{ExtractedData, FieldType, Schema, SchemaField, Step, StepResult};
