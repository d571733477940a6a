//! Session error type
//!
//! Every `PageDriver` capability fails with one of these. None of them are
//! fatal to a worker; the attempt flow folds them into a transient outcome.

use thiserror::Error;

/// What a live page operation can fail with
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Page script failed: {0}")]
    JavaScriptError(String),

    #[error("Browser connection lost: {0}")]
    ConnectionLost(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("No element matching {0}")]
    ElementNotFound(String),

    #[error("Screenshot capture failed: {0}")]
    ScreenshotFailed(String),
}
