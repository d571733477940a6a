//! Chrome session bound to one proxy identity
//!
//! Each worker launches its own Chrome through the DevTools protocol, pointed
//! at that worker's authenticating relay. Input goes through raw CDP key
//! events with human pacing; a handler task owns the CDP event stream and
//! flips the liveness flag when Chrome disconnects.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::driver::PageDriver;
use super::errors::BrowserError;
use crate::proxy::{ProxyIdentity, ProxyRelay};

/// Launch arguments that keep Chrome quiet and hard to fingerprint as automated
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-session-crashed-bubble",
    "--disable-restore-session-state",
    "--disable-notifications",
    "--lang=en-US,en",
];

/// Browser launch settings shared by all workers
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSettings {
    /// Run Chrome headless (new headless mode)
    pub headless: bool,
    /// Fixed window width
    pub window_width: u32,
    /// Fixed window height
    pub window_height: u32,
    /// Explicit Chrome executable, auto-detected when unset
    pub chrome_path: Option<String>,
    /// Base directory for per-worker profiles, temp dir when unset
    pub profile_base_dir: Option<String>,
    /// Pass --no-sandbox (required when running as root)
    pub no_sandbox: bool,
    /// Navigation deadline in seconds
    pub nav_timeout_secs: u64,
    /// Per-character typing delay lower bound in milliseconds
    pub typing_delay_min_ms: u64,
    /// Per-character typing delay upper bound in milliseconds
    pub typing_delay_max_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 720,
            chrome_path: None,
            profile_base_dir: None,
            no_sandbox: true,
            nav_timeout_secs: 60, // matches the submit navigation deadline
            typing_delay_min_ms: 70,
            typing_delay_max_ms: 120,
        }
    }
}

impl BrowserSettings {
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Profile directory for one worker, unique per launch.
    pub fn profile_dir(&self, worker_id: u32) -> PathBuf {
        let base = match &self.profile_base_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join("serp-harvester"),
        };
        base.join(format!("profile_worker{}_{}", worker_id, Uuid::new_v4().simple()))
    }
}

/// One worker's exclusive Chrome session
pub struct ChromeSession {
    label: String,
    browser: Browser,
    page: Page,
    relay: Option<ProxyRelay>,
    alive: Arc<AtomicBool>,
    typing_delay_ms: (u64, u64),
    nav_timeout: Duration,
}

impl ChromeSession {
    /// Launch Chrome for a worker, routed through its proxy identity.
    ///
    /// With `identity` set, a loopback relay is started first and Chrome is
    /// pointed at it; without one the session runs on a direct connection.
    pub async fn launch(
        worker_id: u32,
        settings: &BrowserSettings,
        identity: Option<&ProxyIdentity>,
    ) -> Result<Self, BrowserError> {
        let label = format!("worker-{}", worker_id);
        info!("Launching browser session {} (headless: {})", label, settings.headless);

        let mut relay = None;
        let mut builder = BrowserConfig::builder();

        if settings.headless {
            builder = builder.headless_mode(HeadlessMode::New);
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = settings.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let profile_dir = settings.profile_dir(worker_id);
        let _ = std::fs::create_dir_all(&profile_dir);
        builder = builder
            .user_data_dir(&profile_dir)
            .window_size(settings.window_width, settings.window_height)
            .viewport(None);
        for flag in LAUNCH_ARGS {
            builder = builder.arg(*flag);
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(identity) = identity {
            let mut r = ProxyRelay::for_identity(identity);
            r.start()
                .await
                .map_err(|e| BrowserError::LaunchFailed(format!("proxy relay: {}", e)))?;
            info!("Session {} routed via {} ({})", label, r.local_url(), identity.label());
            builder = builder.arg(format!("--proxy-server={}", r.local_url()));
            relay = Some(r);
        }

        let config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(pair) => pair,
            Err(e) => {
                if let Some(mut r) = relay {
                    r.stop().await;
                }
                return Err(BrowserError::LaunchFailed(e.to_string()));
            }
        };

        // The handler task owns the CDP event stream; when it ends Chrome is gone.
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive.clone();
        let label_for_handler = label.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
            warn!("Session {} Chrome disconnected (event handler ended)", label_for_handler);
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        // Chrome opens with one blank tab; reuse it and drop any extras.
        let page = {
            let mut pages = browser
                .pages()
                .await
                .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;
            let main_page = if !pages.is_empty() {
                pages.remove(0)
            } else {
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?
            };
            for extra in pages {
                debug!("Session {} closing extra blank tab", label);
                let _ = extra.close().await;
            }
            main_page
        };

        if let Err(e) = page.enable_stealth_mode().await {
            warn!("Session {} stealth mode injection failed: {}", label, e);
        }

        info!("Browser session {} ready (profile: {})", label, profile_dir.display());

        Ok(Self {
            label,
            browser,
            page,
            relay,
            alive,
            typing_delay_ms: (settings.typing_delay_min_ms, settings.typing_delay_max_ms),
            nav_timeout: Duration::from_secs(settings.nav_timeout_secs),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Close the page, the browser and the relay, in that order.
    pub async fn close(mut self) {
        self.alive.store(false, Ordering::Relaxed);

        let _ = self.page.clone().close().await;

        // Graceful close first, then force kill so no Chrome child outlives the run
        let _ = self.browser.close().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _ = self.browser.kill().await;

        if let Some(mut relay) = self.relay.take() {
            relay.stop().await;
        }

        info!("Browser session {} closed", self.label);
    }

    fn typing_delay(&self) -> Duration {
        let (lo, hi) = self.typing_delay_ms;
        let mut rng = rand::rngs::StdRng::from_entropy();
        let ms = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        Duration::from_millis(ms)
    }

    async fn dispatch_key(&self, params: DispatchKeyEventParams) -> Result<(), BrowserError> {
        self.page
            .execute(params)
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::JavaScriptError(format!("CDP key event failed: {}", e)))
    }
}

#[async_trait]
impl PageDriver for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Session {} navigating to: {}", self.label, url);
        tokio::time::timeout(self.nav_timeout, self.page.goto(url))
            .await
            .map_err(|_| BrowserError::Timeout(format!("navigation to {}", url)))?
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<(), BrowserError> {
        tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| BrowserError::Timeout("post-submit navigation".into()))?
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        self.page
            .url()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ConnectionLost("no URL".into()))
    }

    async fn title(&self) -> Result<String, BrowserError> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?;
        Ok(title.unwrap_or_default())
    }

    async fn visible_text(&self) -> Result<String, BrowserError> {
        let result = self
            .page
            .evaluate("document.body ? document.body.innerText : ''")
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        result
            .into_value::<String>()
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
    }

    async fn page_html(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        match self.page.find_element(selector).await {
            Ok(_) => Ok(true),
            Err(e) => {
                // Absent element and dead browser both surface as errors here;
                // the liveness flag tells them apart.
                if self.is_alive() {
                    Ok(false)
                } else {
                    Err(BrowserError::ConnectionLost(e.to_string()))
                }
            }
        }
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;
        Ok(())
    }

    async fn clear_focused_input(&self) -> Result<(), BrowserError> {
        // Ctrl+A
        let select_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::RawKeyDown)
            .key("a")
            .code("KeyA")
            .modifiers(2)
            .windows_virtual_key_code(65)
            .build()
            .unwrap();
        self.dispatch_key(select_down).await?;
        let select_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("a")
            .code("KeyA")
            .modifiers(2)
            .windows_virtual_key_code(65)
            .build()
            .unwrap();
        self.dispatch_key(select_up).await?;

        // Backspace
        let backspace_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::RawKeyDown)
            .key("Backspace")
            .code("Backspace")
            .windows_virtual_key_code(8)
            .build()
            .unwrap();
        self.dispatch_key(backspace_down).await?;
        let backspace_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("Backspace")
            .code("Backspace")
            .windows_virtual_key_code(8)
            .build()
            .unwrap();
        self.dispatch_key(backspace_up).await?;

        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        for c in text.chars() {
            let key_down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .text(c.to_string())
                .build()
                .unwrap();
            self.dispatch_key(key_down).await?;

            let key_up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .build()
                .unwrap();
            self.dispatch_key(key_up).await?;

            tokio::time::sleep(self.typing_delay()).await;
        }
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), BrowserError> {
        // Brief pause between finishing typing and submitting
        let mut rng = rand::rngs::StdRng::from_entropy();
        let pause = rng.gen_range(100..300);
        tokio::time::sleep(Duration::from_millis(pause)).await;

        let key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::RawKeyDown)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .build()
            .unwrap();
        self.dispatch_key(key_down).await?;

        // Char event with \r triggers form submission
        let char_event = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::Char)
            .text("\r")
            .build()
            .unwrap();
        self.dispatch_key(char_event).await?;

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key("Enter")
            .code("Enter")
            .windows_virtual_key_code(13)
            .native_virtual_key_code(13)
            .build()
            .unwrap();
        self.dispatch_key(key_up).await?;

        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| BrowserError::ScreenshotFailed(e.to_string()))
    }
}
