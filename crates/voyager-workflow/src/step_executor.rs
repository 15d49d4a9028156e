//! Executes a single declarative `Step` against a `BrowserPage`.
//!
//! Dispatch is an exhaustive `match` over `Step`'s four variants rather than
//! a string-keyed handler registry (the teacher's `TaskHandler` pattern in
//! `executor.rs`): `Step` is a closed, small enum, so the compiler should
//! catch a missing variant at compile time instead of a caller discovering a
//! missing registration at runtime.

use std::time::Instant;
use voyager_core::{BrowserPage, ExtractedData, Step, StepResult};

/// Runs `step` against `page`, always returning a `StepResult` — failures
/// are recorded in the result rather than short-circuiting here; the caller
/// (the workflow runner) decides what a failed step means for retry state.
pub async fn execute_step(page: &dyn BrowserPage, step: &Step) -> StepResult {
    let started = Instant::now();

    let outcome: Result<Option<ExtractedData>, voyager_core::BrowserError> = match step {
        Step::Navigate { url } => page.navigate(url).await.map(|_| None),
        Step::WaitFor {
            selector,
            timeout_ms,
        } => page.wait_for(selector, *timeout_ms).await.map(|_| None),
        Step::Click { selector } => page.click(selector).await.map(|_| None),
        Step::Extract { selector, schema } => {
            extract(page, selector, schema).await.map(Some)
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(data) => StepResult::ok(step, duration_ms, data),
        Err(err) => StepResult::failed(step, duration_ms, err.to_string()),
    }
}

async fn extract(
    page: &dyn BrowserPage,
    selector: &str,
    schema: &voyager_core::Schema,
) -> Result<ExtractedData, voyager_core::BrowserError> {
    let mut data: ExtractedData = std::collections::HashMap::new();
    for field in &schema.fields {
        let value = match page.read_attribute(selector, &field.name).await? {
            Some(v) => Some(v),
            None => page.read_inner_text(selector).await?,
        };
        if let Some(value) = value {
            data.insert(field.name.clone(), serde_json::Value::String(value));
        }
    }
    Ok(data)
}
