//! Per-keyword search flow
//!
//! Drives one attempt through its phases: load the landing page, clear any
//! consent dialog, run the first block checkpoint, wait for the query box,
//! type and submit, run the second block checkpoint, verify the results URL
//! and extract. Phases always move forward; any browser failure folds into
//! a `TransientError` outcome at the top.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, PageDriver};
use crate::provider::{PageSnapshot, SearchProvider};

use super::outcome::{AttemptOutcome, AttemptStatus};

/// Human-pacing delays for one attempt, all in milliseconds
///
/// Two-element fields are inclusive `(min, max)` ranges sampled per pause.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pacing {
    /// Settle pause after the landing page loads
    pub nav_settle_ms: (u64, u64),
    /// Pause before clicking a consent button
    pub consent_pre_click_ms: (u64, u64),
    /// Pause after the consent dialog is dismissed
    pub consent_post_click_ms: (u64, u64),
    /// Pause before focusing the query box
    pub box_focus_pre_ms: (u64, u64),
    /// Pause between focusing the box and clearing it
    pub box_focus_post_ms: (u64, u64),
    /// Pause after the keyword is fully typed
    pub post_typing_ms: (u64, u64),
    /// Settle pause after submission
    pub post_submit_ms: (u64, u64),
    /// Interval between query box polls
    pub box_poll_interval_ms: u64,
    /// Give up waiting for the query box after this long
    pub box_wait_deadline_ms: u64,
    /// Deadline for the navigation triggered by submission
    pub submit_nav_timeout_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            nav_settle_ms: (800, 1_500),
            consent_pre_click_ms: (600, 1_200),
            consent_post_click_ms: (1_200, 1_800),
            box_focus_pre_ms: (1_200, 2_400),
            box_focus_post_ms: (500, 1_000),
            post_typing_ms: (800, 1_400),
            post_submit_ms: (1_200, 2_200),
            box_poll_interval_ms: 300,
            box_wait_deadline_ms: 25_000, // query box rarely takes longer than a few seconds
            submit_nav_timeout_ms: 60_000,
        }
    }
}

/// Sample a delay from an inclusive range, collapsing degenerate ranges.
fn jitter_ms(range: (u64, u64)) -> u64 {
    let (lo, hi) = range;
    if hi > lo {
        rand::thread_rng().gen_range(lo..=hi)
    } else {
        lo
    }
}

async fn pause(range: (u64, u64)) {
    tokio::time::sleep(Duration::from_millis(jitter_ms(range))).await;
}

/// Forward-only phases of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    LandingLoaded,
    ConsentResolved,
    LandingBlockChecked,
    QueryBoxReady,
    QueryTyped,
    Submitted,
    ResultBlockChecked,
    ResultPageVerified,
    Extracted,
}

/// One keyword attempt against one live page
pub struct SearchAttempt<'a, D: PageDriver> {
    driver: &'a D,
    provider: &'static dyn SearchProvider,
    pacing: &'a Pacing,
    result_limit: usize,
    label: String,
}

impl<'a, D: PageDriver> SearchAttempt<'a, D> {
    pub fn new(
        driver: &'a D,
        provider: &'static dyn SearchProvider,
        pacing: &'a Pacing,
        result_limit: usize,
        label: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            provider,
            pacing,
            result_limit,
            label: label.into(),
        }
    }

    /// Run the attempt to a terminal outcome.
    ///
    /// Browser errors do not escape; they end the attempt as `TransientError`
    /// with whatever URL and title are still readable.
    pub async fn run(&self, keyword: &str) -> AttemptOutcome {
        match self.drive(keyword).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{}: Attempt aborted by browser error: {}", self.label, e);
                let url = self.driver.current_url().await.unwrap_or_default();
                let title = self.safe_title().await;
                AttemptOutcome::failure(AttemptStatus::TransientError, url, title)
            }
        }
    }

    async fn drive(&self, keyword: &str) -> Result<AttemptOutcome, BrowserError> {
        let mut phase = Phase::Init;

        self.driver.navigate(self.provider.home_url()).await?;
        pause(self.pacing.nav_settle_ms).await;
        self.advance(&mut phase, Phase::LandingLoaded);

        self.resolve_consent().await?;
        self.advance(&mut phase, Phase::ConsentResolved);

        let snap = self.snapshot().await?;
        if self.provider.is_blocked(&snap) {
            warn!("{}: Block page detected on landing ({})", self.label, snap.url);
            return Ok(AttemptOutcome::failure(
                AttemptStatus::BlockedOnLanding,
                snap.url,
                snap.title,
            ));
        }
        self.advance(&mut phase, Phase::LandingBlockChecked);

        if !self.wait_for_query_box().await? {
            warn!("{}: Search box never appeared", self.label);
            let url = self.driver.current_url().await.unwrap_or_default();
            let title = self.safe_title().await;
            return Ok(AttemptOutcome::failure(
                AttemptStatus::SearchBoxNotFound,
                url,
                title,
            ));
        }
        self.advance(&mut phase, Phase::QueryBoxReady);

        pause(self.pacing.box_focus_pre_ms).await;
        self.driver.click(self.provider.query_box_selector()).await?;
        pause(self.pacing.box_focus_post_ms).await;
        self.driver.clear_focused_input().await?;
        self.driver.type_text(keyword).await?;
        pause(self.pacing.post_typing_ms).await;
        self.advance(&mut phase, Phase::QueryTyped);

        // Submission races the enter press against the navigation it triggers.
        // Providers sometimes swap results in without a navigation, so a nav
        // timeout here is tolerated; a failed key press is not.
        let nav_timeout = Duration::from_millis(self.pacing.submit_nav_timeout_ms);
        let (nav, pressed) = tokio::join!(
            self.driver.wait_for_navigation(nav_timeout),
            self.driver.press_enter(),
        );
        pressed?;
        if let Err(e) = nav {
            debug!("{}: Navigation wait after submit ended early: {}", self.label, e);
        }
        pause(self.pacing.post_submit_ms).await;
        self.advance(&mut phase, Phase::Submitted);

        let snap = self.snapshot().await?;
        if self.provider.is_blocked(&snap) {
            warn!("{}: Block page detected after search ({})", self.label, snap.url);
            return Ok(AttemptOutcome::failure(
                AttemptStatus::BlockedAfterSearch,
                snap.url,
                snap.title,
            ));
        }
        self.advance(&mut phase, Phase::ResultBlockChecked);

        if !self.provider.is_results_url(&snap.url) {
            warn!("{}: Not on a results page after submit ({})", self.label, snap.url);
            return Ok(AttemptOutcome::failure(
                AttemptStatus::NotSearchPage,
                snap.url,
                snap.title,
            ));
        }
        self.advance(&mut phase, Phase::ResultPageVerified);

        let html = self.driver.page_html().await?;
        let results = self.provider.extract(&html, self.result_limit);
        self.advance(&mut phase, Phase::Extracted);
        info!(
            "{}: Extracted {} results for keyword: {}",
            self.label,
            results.len(),
            keyword
        );

        Ok(AttemptOutcome::success(snap.url, snap.title, results))
    }

    fn advance(&self, phase: &mut Phase, next: Phase) {
        debug!("{}: {:?} -> {:?}", self.label, *phase, next);
        *phase = next;
    }

    /// Dismiss the first matching consent dialog, if any.
    ///
    /// A missing dialog and a failed click both leave the attempt running;
    /// only a dead browser escapes as an error.
    async fn resolve_consent(&self) -> Result<(), BrowserError> {
        for selector in self.provider.consent_selectors() {
            match self.driver.has_element(selector).await {
                Ok(true) => {
                    debug!("{}: Consent dialog present ({})", self.label, selector);
                    pause(self.pacing.consent_pre_click_ms).await;
                    match self.driver.click(selector).await {
                        Ok(()) => {
                            info!("{}: Accepted consent dialog", self.label);
                            pause(self.pacing.consent_post_click_ms).await;
                        }
                        Err(e) => {
                            debug!("{}: Consent click failed ({}): {}", self.label, selector, e);
                        }
                    }
                    return Ok(());
                }
                Ok(false) => continue,
                Err(e) => return Err(e),
            }
        }
        debug!("{}: No consent dialog", self.label);
        Ok(())
    }

    /// Poll for the query box until it appears or the deadline passes.
    async fn wait_for_query_box(&self) -> Result<bool, BrowserError> {
        let deadline = Duration::from_millis(self.pacing.box_wait_deadline_ms);
        let interval = Duration::from_millis(self.pacing.box_poll_interval_ms);
        let started = Instant::now();
        loop {
            if self
                .driver
                .has_element(self.provider.query_box_selector())
                .await?
            {
                return Ok(true);
            }
            if started.elapsed() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Page state fed into block detection.
    async fn snapshot(&self) -> Result<PageSnapshot, BrowserError> {
        let url = self.driver.current_url().await?;
        let title = self.safe_title().await;
        let visible_text = self.driver.visible_text().await.unwrap_or_default();
        let has_challenge_frame = self
            .driver
            .has_element(self.provider.challenge_frame_selector())
            .await
            .unwrap_or(false);
        Ok(PageSnapshot {
            url,
            title,
            visible_text,
            has_challenge_frame,
        })
    }

    /// Title reads fail on half-loaded pages; retry a few times, then give up.
    async fn safe_title(&self) -> String {
        for _ in 0..3 {
            if let Ok(title) = self.driver.title().await {
                return title;
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        "N/A".to_string()
    }
}
