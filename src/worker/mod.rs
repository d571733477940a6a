//! Worker orchestration
//!
//! Each worker binds one proxy identity to one browser session and runs the
//! full retry sequence for one keyword, isolated from its siblings.

mod ipinfo;
mod orchestrator;

pub use ipinfo::IpInfo;
pub use orchestrator::{run_attempts, run_worker, WorkerContext, WorkerReport};
