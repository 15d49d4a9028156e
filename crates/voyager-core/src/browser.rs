//! The opaque browser-handle boundary the step executor and probes call
//! through. The concrete automation protocol (CDP, WebDriver, a remote
//! automation HTTP client) is a property of the runtime environment and is
//! out of scope here — this trait is the seam.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a concrete `BrowserPage` implementation.
#[derive(Error, Debug, Clone)]
pub enum BrowserError {
    #[error("element not found: {0}")]
    NotFound(String),

    #[error("timed out waiting for: {0}")]
    Timeout(String),

    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

/// A single automation-protocol session against one browser page.
///
/// Implementations are provided by the runtime host; the engine only ever
/// holds a `dyn BrowserPage` behind an `Arc`.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn wait_for(&self, selector: &str, timeout_ms: u64) -> Result<(), BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Reads `attribute` off the first element matching `selector`.
    ///
    /// Returns `Ok(None)` if the element exists but lacks the attribute;
    /// returns `Err(NotFound)` if no element matches.
    async fn read_attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, BrowserError>;

    /// Reads the inner text of the first element matching `selector`.
    async fn read_inner_text(&self, selector: &str) -> Result<Option<String>, BrowserError>;
}
