//! Worker lifecycle
//!
//! One worker owns one proxy identity, one browser session and one keyword.
//! The session is opened once, reused across every retry of that keyword and
//! released on every exit path. Workers never raise; whatever happens inside
//! an attempt ends up in the `WorkerReport`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::browser::{BrowserSettings, ChromeSession, PageDriver};
use crate::provider::ProviderKind;
use crate::proxy::ProxyIdentity;
use crate::search::{AttemptOutcome, AttemptStatus, Pacing, SearchAttempt};
use crate::stats::RunStats;

use super::ipinfo::{self, IpInfo};

/// Everything one worker needs, owned so tasks can move it
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub worker_id: u32,
    pub keyword: String,
    pub provider: ProviderKind,
    pub max_retries: u32,
    pub result_limit: usize,
    pub screenshot_dir: PathBuf,
    /// `None` runs the worker on a direct connection
    pub identity: Option<ProxyIdentity>,
    pub browser: BrowserSettings,
    pub pacing: Pacing,
    pub backoff: BackoffPolicy,
    pub stats: Arc<RunStats>,
}

/// Final record of one worker's keyword run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub worker_id: u32,
    pub keyword: String,
    /// Attempts actually made, 0 when the browser never launched
    pub attempts: u32,
    pub succeeded: bool,
    /// Outcome of the last attempt
    pub outcome: AttemptOutcome,
    pub ip_info: Option<IpInfo>,
    pub finished_at: DateTime<Utc>,
}

/// Run one worker end to end: launch a session, check the exit IP, then
/// drive the retry loop. Never returns an error.
pub async fn run_worker(ctx: WorkerContext) -> WorkerReport {
    ctx.stats.worker_started();
    info!(
        "Worker {} starting | Keyword: {} | Provider: {}",
        ctx.worker_id,
        ctx.keyword,
        ctx.provider.as_str()
    );

    if ctx.identity.is_none() {
        warn!("Worker {}: proxy not configured, using direct connection", ctx.worker_id);
    }

    let session = match ChromeSession::launch(ctx.worker_id, &ctx.browser, ctx.identity.as_ref()).await {
        Ok(session) => session,
        Err(e) => {
            error!("Worker {}: Browser launch failed: {}", ctx.worker_id, e);
            ctx.stats.worker_finished();
            return WorkerReport {
                worker_id: ctx.worker_id,
                keyword: ctx.keyword.clone(),
                attempts: 0,
                succeeded: false,
                outcome: AttemptOutcome::failure(
                    AttemptStatus::TransientError,
                    String::new(),
                    String::new(),
                ),
                ip_info: None,
                finished_at: Utc::now(),
            };
        }
    };

    let ip_info = match &ctx.identity {
        Some(identity) => {
            let info = ipinfo::lookup_exit_ip(identity).await;
            if let Some(info) = &info {
                info!("Worker {} | {}", ctx.worker_id, info.summary());
            }
            info
        }
        None => None,
    };

    let mut report = run_attempts(&ctx, &session).await;
    session.close().await;

    report.ip_info = ip_info;
    ctx.stats.worker_finished();
    info!(
        "Worker {} done | Keyword: {} | Result: {}",
        ctx.worker_id,
        ctx.keyword,
        report.outcome.status.reason()
    );
    report
}

/// The retry loop over an already-live page.
///
/// Generic over the driver so the loop can run against a scripted page in
/// tests. Exactly `max_retries` attempts at most, a backoff delay between
/// consecutive attempts and none after the last.
pub async fn run_attempts<D: PageDriver>(ctx: &WorkerContext, driver: &D) -> WorkerReport {
    let provider = ctx.provider.provider();
    let runner = SearchAttempt::new(
        driver,
        provider,
        &ctx.pacing,
        ctx.result_limit,
        format!("Worker {}", ctx.worker_id),
    );

    let mut attempts = 0u32;
    let mut last_outcome: Option<AttemptOutcome> = None;

    for attempt in 0..ctx.max_retries {
        attempts = attempt + 1;
        info!(
            "Worker {} | Keyword: {} | Attempt: {}",
            ctx.worker_id, ctx.keyword, attempts
        );
        ctx.stats.record_attempt();

        let outcome = runner.run(&ctx.keyword).await;
        let status = outcome.status;
        record_outcome(&ctx.stats, status);

        if status.is_success() {
            info!(
                "Worker {}: Success on attempt {} with {} results",
                ctx.worker_id,
                attempts,
                outcome.results.len()
            );
            last_outcome = Some(outcome);
            break;
        }

        warn!(
            "Worker {}: Attempt {} ended: {} (url: {})",
            ctx.worker_id,
            attempts,
            status.reason(),
            outcome.current_url
        );
        save_failure_screenshot(ctx, driver, attempt).await;
        last_outcome = Some(outcome);

        if attempts < ctx.max_retries {
            ctx.backoff.wait(attempt).await;
        } else {
            warn!(
                "Worker {}: Max retries reached for keyword: {}",
                ctx.worker_id, ctx.keyword
            );
        }
    }

    let outcome = last_outcome.unwrap_or_else(|| {
        AttemptOutcome::failure(AttemptStatus::TransientError, String::new(), String::new())
    });

    WorkerReport {
        worker_id: ctx.worker_id,
        keyword: ctx.keyword.clone(),
        attempts,
        succeeded: outcome.is_success(),
        outcome,
        ip_info: None,
        finished_at: Utc::now(),
    }
}

fn record_outcome(stats: &RunStats, status: AttemptStatus) {
    if status.is_success() {
        stats.record_success();
    } else if status.is_blocked() {
        stats.record_block();
    } else {
        stats.record_failure();
    }
}

/// Best-effort full-page screenshot of a failed attempt.
async fn save_failure_screenshot<D: PageDriver>(ctx: &WorkerContext, driver: &D, attempt: u32) {
    let file = ctx.screenshot_dir.join(format!(
        "debug_worker{}_attempt{}.png",
        ctx.worker_id,
        attempt + 1
    ));

    match driver.screenshot_png().await {
        Ok(bytes) => {
            if let Some(parent) = file.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            match tokio::fs::write(&file, bytes).await {
                Ok(()) => info!(
                    "Worker {}: Saved failure screenshot: {}",
                    ctx.worker_id,
                    file.display()
                ),
                Err(e) => warn!(
                    "Worker {}: Could not write screenshot {}: {}",
                    ctx.worker_id,
                    file.display(),
                    e
                ),
            }
        }
        Err(e) => warn!("Worker {}: Screenshot capture failed: {}", ctx.worker_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    use crate::testutil::{self, FakeDriver, FakePage};

    fn test_ctx(keyword: &str, max_retries: u32) -> WorkerContext {
        WorkerContext {
            worker_id: 1,
            keyword: keyword.to_string(),
            provider: ProviderKind::Google,
            max_retries,
            result_limit: 5,
            screenshot_dir: std::env::temp_dir()
                .join(format!("serp-harvester-test-{}", uuid::Uuid::new_v4())),
            identity: None,
            browser: BrowserSettings::default(),
            pacing: testutil::fast_pacing(),
            backoff: BackoffPolicy {
                base_delay_ms: 100,
                max_delay_ms: 10_000,
                jitter_ms: 0,
            },
            stats: Arc::new(RunStats::new()),
        }
    }

    fn not_a_results_page() -> FakePage {
        FakePage::new("https://www.google.com/intl/en/about", "About Google")
    }

    #[tokio::test]
    async fn test_exhaustion_after_max_retries_with_two_delays() {
        let driver = FakeDriver::new(testutil::google_landing(), not_a_results_page());
        let ctx = test_ctx("rust jobs", 3);

        let started = Instant::now();
        let report = run_attempts(&ctx, &driver).await;
        let elapsed = started.elapsed();

        assert_eq!(report.attempts, 3);
        assert!(!report.succeeded);
        assert_eq!(report.outcome.status, AttemptStatus::NotSearchPage);
        assert_eq!(driver.count("navigate:"), 3);
        // two backoff delays (100ms then 200ms) between three attempts, no
        // delay after the last one
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(650));

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.total_attempts, 3);
        assert_eq!(snap.failures, 3);
        assert_eq!(snap.successes, 0);

        let _ = std::fs::remove_dir_all(&ctx.screenshot_dir);
    }

    #[tokio::test]
    async fn test_success_stops_retrying_immediately() {
        let driver = FakeDriver::new(
            testutil::google_landing(),
            testutil::google_results("rust jobs", 6),
        );
        let ctx = test_ctx("rust jobs", 3);

        let report = run_attempts(&ctx, &driver).await;

        assert_eq!(report.attempts, 1);
        assert!(report.succeeded);
        assert_eq!(report.outcome.results.len(), 5);
        assert_eq!(driver.count("screenshot"), 0);
        assert_eq!(ctx.stats.snapshot().successes, 1);
    }

    #[tokio::test]
    async fn test_failed_attempts_capture_screenshots() {
        let driver = FakeDriver::new(testutil::google_landing(), not_a_results_page());
        let mut ctx = test_ctx("rust jobs", 2);
        ctx.backoff.base_delay_ms = 1;

        let report = run_attempts(&ctx, &driver).await;

        assert_eq!(report.attempts, 2);
        assert_eq!(driver.count("screenshot"), 2);
        let first = ctx.screenshot_dir.join("debug_worker1_attempt1.png");
        let second = ctx.screenshot_dir.join("debug_worker1_attempt2.png");
        assert!(first.exists());
        assert!(second.exists());

        let _ = std::fs::remove_dir_all(&ctx.screenshot_dir);
    }

    #[tokio::test]
    async fn test_screenshot_failure_does_not_stop_the_loop() {
        let landing = FakePage::new("https://www.google.com/", "Google");
        let driver = FakeDriver::new(landing, not_a_results_page()).failing_screenshot();
        let mut ctx = test_ctx("rust jobs", 2);
        ctx.backoff.base_delay_ms = 1;

        let report = run_attempts(&ctx, &driver).await;

        // landing page has no query box, so every attempt times out on it
        assert_eq!(report.attempts, 2);
        assert_eq!(report.outcome.status, AttemptStatus::SearchBoxNotFound);
        assert_eq!(driver.count("screenshot"), 2);
    }

    #[tokio::test]
    async fn test_workers_run_independently() {
        let ok_driver = FakeDriver::new(
            testutil::google_landing(),
            testutil::google_results("alpha", 3),
        );
        let bad_driver = FakeDriver::new(testutil::google_landing(), not_a_results_page());

        let stats = Arc::new(RunStats::new());
        let mut ctx_ok = test_ctx("alpha", 2);
        ctx_ok.stats = stats.clone();
        let mut ctx_bad = test_ctx("beta", 2);
        ctx_bad.worker_id = 2;
        ctx_bad.backoff.base_delay_ms = 1;
        ctx_bad.stats = stats.clone();

        let (report_ok, report_bad) = tokio::join!(
            run_attempts(&ctx_ok, &ok_driver),
            run_attempts(&ctx_bad, &bad_driver),
        );

        assert!(report_ok.succeeded);
        assert_eq!(report_ok.attempts, 1);
        assert!(!report_bad.succeeded);
        assert_eq!(report_bad.attempts, 2);

        let snap = stats.snapshot();
        assert_eq!(snap.total_attempts, 3);
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.failures, 2);

        let _ = std::fs::remove_dir_all(&ctx_bad.screenshot_dir);
    }

    #[test]
    fn test_record_outcome_mapping() {
        let stats = RunStats::new();
        record_outcome(&stats, AttemptStatus::Success);
        record_outcome(&stats, AttemptStatus::BlockedOnLanding);
        record_outcome(&stats, AttemptStatus::BlockedAfterSearch);
        record_outcome(&stats, AttemptStatus::SearchBoxNotFound);
        record_outcome(&stats, AttemptStatus::TransientError);

        let snap = stats.snapshot();
        assert_eq!(snap.successes, 1);
        assert_eq!(snap.blocked, 2);
        assert_eq!(snap.failures, 2);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = WorkerReport {
            worker_id: 2,
            keyword: "rust async runtime".into(),
            attempts: 1,
            succeeded: true,
            outcome: AttemptOutcome::success(
                "https://www.google.com/search?q=rust+async+runtime".into(),
                "rust async runtime - Google Search".into(),
                Vec::new(),
            ),
            ip_info: None,
            finished_at: Utc::now(),
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"workerId\":2"));
        assert!(json.contains("\"ipInfo\":null"));
        assert!(json.contains("\"status\":\"success\""));
    }
}
