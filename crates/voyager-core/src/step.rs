//! The declarative step model: what a task does, with no execution state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The type of a single extracted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    #[serde(other)]
    Unknown,
}

/// One `(fieldName, fieldType)` entry in an `Extract` step's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// An ordered list of fields an `Extract` step reads off the matched element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }
}

/// A single declarative browser-automation step.
///
/// Carries no execution state — it is purely a definition consumed by the
/// step executor. Dispatch over this enum is an exhaustive `match`; adding a
/// variant here without updating every executor is a compile error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Step {
    Navigate {
        url: String,
    },
    WaitFor {
        selector: String,
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Click {
        selector: String,
    },
    Extract {
        selector: String,
        schema: Schema,
    },
}

impl Step {
    /// A short, stable label for logging and events — not the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Navigate { .. } => "navigate",
            Step::WaitFor { .. } => "waitFor",
            Step::Click { .. } => "click",
            Step::Extract { .. } => "extract",
        }
    }
}

/// Extracted field values keyed by schema field name.
pub type ExtractedData = HashMap<String, serde_json::Value>;

/// Outcome of executing a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_kind: String,
    pub success: bool,
    pub duration_ms: u64,
    pub data: Option<ExtractedData>,
    pub error: Option<String>,
}

impl StepResult {
    pub fn ok(step: &Step, duration_ms: u64, data: Option<ExtractedData>) -> Self {
        Self {
            step_kind: step.kind().to_string(),
            success: true,
            duration_ms,
            data,
            error: None,
        }
    }

    pub fn failed(step: &Step, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            step_kind: step.kind().to_string(),
            success: false,
            duration_ms,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_step_round_trips_through_json() {
        let json = serde_json::json!({"type": "navigate", "url": "https://example.com"});
        let step: Step = serde_json::from_value(json).unwrap();
        assert_eq!(step, Step::Navigate { url: "https://example.com".to_string() });
    }

    #[test]
    fn extract_step_parses_schema_fields() {
        let json = serde_json::json!({
            "type": "extract",
            "selector": "#price",
            "schema": {"fields": [{"name": "price", "type": "number"}]}
        });
        let step: Step = serde_json::from_value(json).unwrap();
        match step {
            Step::Extract { selector, schema } => {
                assert_eq!(selector, "#price");
                assert_eq!(schema.fields[0].name, "price");
                assert_eq!(schema.fields[0].field_type, FieldType::Number);
            }
            _ => panic!("expected Extract"),
        }
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let json = serde_json::json!({"type": "teleport", "url": "https://example.com"});
        assert!(serde_json::from_value::<Step>(json).is_err());
    }
}
