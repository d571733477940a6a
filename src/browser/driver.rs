//! Page capability seam
//!
//! The attempt state machine and the worker orchestrator talk to the page
//! only through this trait, so both run against a scripted driver in tests
//! and against `ChromeSession` in production.

use std::time::Duration;

use async_trait::async_trait;

use super::errors::BrowserError;

/// Everything an attempt needs from a live page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait until the document is usable.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Wait for the next navigation, bounded by `timeout`.
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    /// Rendered text of the document body.
    async fn visible_text(&self) -> Result<String, BrowserError>;

    /// Full serialized HTML of the current document.
    async fn page_html(&self) -> Result<String, BrowserError>;

    /// Whether a selector currently matches. `Ok(false)` means absent;
    /// `Err` is reserved for a dead browser.
    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError>;

    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Select-all plus delete in the focused input.
    async fn clear_focused_input(&self) -> Result<(), BrowserError>;

    /// Type into the focused element with per-character pacing.
    async fn type_text(&self, text: &str) -> Result<(), BrowserError>;

    async fn press_enter(&self) -> Result<(), BrowserError>;

    /// Full-page PNG capture.
    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;
}
