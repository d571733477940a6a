//! Scripted page driver for flow tests
//!
//! `FakeDriver` stands in for a live Chrome session: it serves two scripted
//! pages (the landing page and whatever submission lands on), records every
//! call and can be told to fail navigation or screenshots.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::browser::{BrowserError, PageDriver};
use crate::search::Pacing;

/// One scripted page the fake driver can sit on
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub url: String,
    pub title: String,
    pub visible_text: String,
    pub html: String,
    /// Selectors `has_element` reports present
    pub selectors: Vec<String>,
}

impl FakePage {
    pub fn new(url: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.visible_text = text.to_string();
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Start,
    Landing,
    Submitted,
}

struct FakeState {
    current: Current,
    calls: Vec<String>,
    /// Selector reported absent for the first N queries, present after
    delayed: Option<(String, u32)>,
}

/// Drives the search flow over scripted pages, recording every call
pub struct FakeDriver {
    landing: FakePage,
    after_submit: FakePage,
    state: Mutex<FakeState>,
    fail_navigate: bool,
    fail_screenshot: bool,
}

impl FakeDriver {
    pub fn new(landing: FakePage, after_submit: FakePage) -> Self {
        Self {
            landing,
            after_submit,
            state: Mutex::new(FakeState {
                current: Current::Start,
                calls: Vec::new(),
                delayed: None,
            }),
            fail_navigate: false,
            fail_screenshot: false,
        }
    }

    /// Report `selector` absent for the first `polls` queries.
    pub fn with_delayed_selector(self, selector: &str, polls: u32) -> Self {
        self.state.lock().unwrap().delayed = Some((selector.to_string(), polls));
        self
    }

    pub fn failing_navigation(mut self) -> Self {
        self.fail_navigate = true;
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn current(&self) -> Current {
        self.state.lock().unwrap().current
    }

    fn page(&self, current: Current) -> &FakePage {
        match current {
            Current::Start | Current::Landing => &self.landing,
            Current::Submitted => &self.after_submit,
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.record(format!("navigate:{}", url));
        if self.fail_navigate {
            return Err(BrowserError::NavigationFailed("connection reset".into()));
        }
        self.state.lock().unwrap().current = Current::Landing;
        Ok(())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> Result<(), BrowserError> {
        self.record("wait_nav".to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(match self.current() {
            Current::Start => "about:blank".to_string(),
            current => self.page(current).url.clone(),
        })
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(match self.current() {
            Current::Start => String::new(),
            current => self.page(current).title.clone(),
        })
    }

    async fn visible_text(&self) -> Result<String, BrowserError> {
        Ok(match self.current() {
            Current::Start => String::new(),
            current => self.page(current).visible_text.clone(),
        })
    }

    async fn page_html(&self) -> Result<String, BrowserError> {
        Ok(match self.current() {
            Current::Start => String::new(),
            current => self.page(current).html.clone(),
        })
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if let Some((delayed_selector, remaining)) = &mut state.delayed {
            if delayed_selector == selector {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(false);
                }
                return Ok(true);
            }
        }
        let current = state.current;
        drop(state);
        Ok(match current {
            Current::Start => false,
            current => self.page(current).selectors.iter().any(|s| s == selector),
        })
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        self.record(format!("click:{}", selector));
        let current = self.current();
        let present = current != Current::Start
            && self.page(current).selectors.iter().any(|s| s == selector);
        let delayed_ready = self
            .state
            .lock()
            .unwrap()
            .delayed
            .as_ref()
            .map_or(false, |(s, remaining)| s == selector && *remaining == 0);
        if present || delayed_ready {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn clear_focused_input(&self) -> Result<(), BrowserError> {
        self.record("clear".to_string());
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        self.record(format!("type:{}", text));
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), BrowserError> {
        self.record("enter".to_string());
        self.state.lock().unwrap().current = Current::Submitted;
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.record("screenshot".to_string());
        if self.fail_screenshot {
            return Err(BrowserError::ScreenshotFailed("target closed".into()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

/// Google landing page with the query box present and nothing in the way.
pub fn google_landing() -> FakePage {
    FakePage::new("https://www.google.com/", "Google")
        .with_text("Google Search I'm Feeling Lucky")
        .with_selector("textarea[name='q'], input[name='q']")
}

/// Results page for `keyword` carrying `blocks` well-formed organic hits.
pub fn google_results(keyword: &str, blocks: usize) -> FakePage {
    let url = format!(
        "https://www.google.com/search?q={}",
        keyword.replace(' ', "+")
    );
    FakePage::new(&url, &format!("{} - Google Search", keyword)).with_html(&google_serp_html(blocks))
}

pub fn google_serp_html(count: usize) -> String {
    let mut html = String::from("<html><body><div id=\"search\">");
    for i in 1..=count {
        html.push_str(&format!(
            "<div class=\"g\"><a href=\"https://example.com/page{i}\"><h3>Result {i}</h3></a><div class=\"VwiC3b\">Snippet {i}.</div></div>"
        ));
    }
    html.push_str("</div></body></html>");
    html
}

/// Pacing with every pause collapsed so flow tests finish in milliseconds.
pub fn fast_pacing() -> Pacing {
    Pacing {
        nav_settle_ms: (0, 0),
        consent_pre_click_ms: (0, 0),
        consent_post_click_ms: (0, 0),
        box_focus_pre_ms: (0, 0),
        box_focus_post_ms: (0, 0),
        post_typing_ms: (0, 0),
        post_submit_ms: (0, 0),
        box_poll_interval_ms: 5,
        box_wait_deadline_ms: 100,
        submit_nav_timeout_ms: 1_000,
    }
}
