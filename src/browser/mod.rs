//! Browser automation module
//!
//! Launches one Chrome instance per worker, each routed through its own proxy
//! identity, and exposes the page operations the search flow needs behind the
//! `PageDriver` trait.

mod driver;
mod errors;
mod session;

pub use driver::PageDriver;
pub use errors::BrowserError;
pub use session::{BrowserSettings, ChromeSession};
