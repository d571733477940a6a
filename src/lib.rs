//! SERP Harvester
//!
//! Concurrent search-engine result harvesting through residential proxy
//! identities. Each worker binds one sticky proxy identity to one isolated
//! Chrome session, drives one keyword through the search flow with block
//! detection at two checkpoints, and retries with exponential backoff.

pub mod backoff;
pub mod browser;
pub mod provider;
pub mod proxy;
pub mod search;
pub mod stats;
pub mod worker;

#[cfg(test)]
pub(crate) mod testutil;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use backoff::BackoffPolicy;
use browser::BrowserSettings;
use provider::ProviderKind;
use proxy::{IdentityBuilder, ProxySettings};
use search::{AttemptOutcome, AttemptStatus, Pacing};
use stats::{RunStats, RunStatsSnapshot};
use worker::{WorkerContext, WorkerReport};

/// Run configuration, read once at startup and immutable afterwards
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarvestConfig {
    /// Number of concurrent workers
    pub workers: u32,
    /// Keywords assigned to workers round-robin
    pub keywords: Vec<String>,
    /// Search provider every worker drives
    pub provider: ProviderKind,
    /// Attempts per keyword before giving up
    pub max_retries: u32,
    /// Result hits collected per successful attempt
    pub result_limit: usize,
    /// Directory failure screenshots are written to
    pub screenshot_dir: String,
    pub proxy: ProxySettings,
    pub browser: BrowserSettings,
    pub pacing: Pacing,
    pub backoff: BackoffPolicy,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            keywords: vec![
                "rust async runtime comparison".to_string(),
                "residential proxy pricing".to_string(),
                "headless chrome detection".to_string(),
            ],
            provider: ProviderKind::default(),
            max_retries: 3,
            result_limit: 5,
            screenshot_dir: ".".to_string(), // screenshots land next to the binary
            proxy: ProxySettings::default(),
            browser: BrowserSettings::default(),
            pacing: Pacing::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Configuration rejected before any worker starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no keywords configured")]
    NoKeywords,
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("max retries must be at least 1")]
    NoRetries,
    #[error("result limit must be at least 1")]
    NoResultLimit,
}

impl HarvestConfig {
    /// Load config from a JSON file, falling back to defaults.
    ///
    /// Proxy credentials can be supplied or overridden through the
    /// `SERP_PROXY_USERNAME` / `SERP_PROXY_PASSWORD` environment variables
    /// so they never have to live in the file.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut config = if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => {
                        info!("Loaded config from {:?}", path);
                        config
                    }
                    Err(e) => {
                        warn!("Failed to parse config file {:?}: {}", path, e);
                        Self::default()
                    }
                },
                Err(e) => {
                    warn!("Failed to read config file {:?}: {}", path, e);
                    Self::default()
                }
            }
        } else {
            info!("No config file at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("SERP_PROXY_USERNAME") {
            self.proxy.username = username;
        }
        if let Ok(password) = std::env::var("SERP_PROXY_PASSWORD") {
            self.proxy.password = password;
        }
    }

    /// Reject configurations no run can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keywords.is_empty() {
            return Err(ConfigError::NoKeywords);
        }
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.max_retries == 0 {
            return Err(ConfigError::NoRetries);
        }
        if self.result_limit == 0 {
            return Err(ConfigError::NoResultLimit);
        }
        Ok(())
    }
}

/// Everything one run produced, serialized to stdout at the end
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub workers: Vec<WorkerReport>,
    pub stats: RunStatsSnapshot,
    pub finished_at: DateTime<Utc>,
}

/// Run the whole harvest: spawn one task per worker, wait for every one to
/// settle and collect their reports. Workers never abort each other; a
/// panicking worker is folded into a transient-failure report.
pub async fn run(config: HarvestConfig) -> Result<RunReport, ConfigError> {
    config.validate()?;

    let stats = Arc::new(RunStats::new());
    let identity_builder = if config.proxy.is_configured() {
        Some(IdentityBuilder::new(&config.proxy))
    } else {
        None
    };

    info!(
        "Starting run: {} workers | {} keywords | provider: {}",
        config.workers,
        config.keywords.len(),
        config.provider.as_str()
    );

    let mut handles = Vec::with_capacity(config.workers as usize);
    for worker_id in 1..=config.workers {
        let keyword_index = ((worker_id - 1) as usize) % config.keywords.len();
        let ctx = WorkerContext {
            worker_id,
            keyword: config.keywords[keyword_index].clone(),
            provider: config.provider,
            max_retries: config.max_retries,
            result_limit: config.result_limit,
            screenshot_dir: PathBuf::from(&config.screenshot_dir),
            identity: identity_builder.as_ref().map(|b| b.build(worker_id)),
            browser: config.browser.clone(),
            pacing: config.pacing.clone(),
            backoff: config.backoff.clone(),
            stats: stats.clone(),
        };
        handles.push(spawn_worker_task(ctx));
    }

    let mut workers = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => workers.push(report),
            Err(e) => error!("Worker task could not be joined: {}", e),
        }
    }
    workers.sort_by_key(|r| r.worker_id);

    let snapshot = stats.snapshot();
    info!(
        "Run finished: {}/{} attempts succeeded | blocked: {} | failures: {}",
        snapshot.successes, snapshot.total_attempts, snapshot.blocked, snapshot.failures
    );

    Ok(RunReport {
        workers,
        stats: snapshot,
        finished_at: Utc::now(),
    })
}

/// Spawn one worker task that survives panics.
///
/// A panic inside a worker must never take down its siblings; it is caught,
/// logged and turned into a transient-failure report.
fn spawn_worker_task(ctx: WorkerContext) -> tokio::task::JoinHandle<WorkerReport> {
    let worker_id = ctx.worker_id;
    let keyword = ctx.keyword.clone();
    let stats_cleanup = ctx.stats.clone();

    tokio::spawn(async move {
        let result = std::panic::AssertUnwindSafe(worker::run_worker(ctx));

        use futures::FutureExt;
        match result.catch_unwind().await {
            Ok(report) => report,
            Err(panic_info) => {
                let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };

                error!("Worker {} panicked: {}. Recording transient failure.", worker_id, panic_msg);
                stats_cleanup.worker_finished();

                WorkerReport {
                    worker_id,
                    keyword,
                    attempts: 0,
                    succeeded: false,
                    outcome: AttemptOutcome::failure(
                        AttemptStatus::TransientError,
                        String::new(),
                        String::new(),
                    ),
                    ip_info: None,
                    finished_at: Utc::now(),
                }
            }
        }
    })
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("serp-harvester").join("logs"))
}

/// Initialize logging to console and a daily rolling file
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    if let Some(log_dir) = log_dir() {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "serp-harvester.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}
