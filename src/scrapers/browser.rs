//! Rendering surface: the one capability boundary onto the headless browser.
//!
//! Source adapters and load strategies only ever talk to [`RenderSurface`],
//! so everything above this module is testable against a scripted fake.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

/// Script evaluated after every navigation to suppress the most common
/// automation tell.
const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined});";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// A single rendering session. One session per adapter invocation, driven by
/// exactly one caller at a time.
#[async_trait]
pub trait RenderSurface: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    /// Wait a fixed interval for asynchronous content to arrive.
    async fn settle(&mut self, wait: Duration) -> Result<()>;
    /// Run a script for its side effects (scroll nudges and the like).
    async fn evaluate(&mut self, script: &str) -> Result<()>;
    /// Number of currently rendered elements matching a CSS selector.
    async fn count(&mut self, selector: &str) -> Result<usize>;
    /// Scroll the last rendered match into view to trigger lazy loading.
    async fn scroll_last_into_view(&mut self, selector: &str) -> Result<()>;
    /// Whether an end-of-results marker is rendered (XPath query).
    async fn marker_visible(&mut self, xpath: &str) -> Result<bool>;
    /// Full rendered DOM as HTML text.
    async fn content(&mut self) -> Result<String>;
}

/// Opens rendering sessions. The pipeline acquires one per scrape stage and
/// releases it unconditionally when the stage ends.
#[async_trait]
pub trait SurfaceProvider: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSurface>>;
}

/// Production surface backed by headless Chrome.
pub struct ChromeSession {
    // Keeps the browser process alive; dropping the session closes it.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    pub fn launch(headless: bool) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(headless)
            .window_size(Some((1920, 1080)))
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--no-sandbox"),
                OsStr::new("--lang=he-IL"),
            ])
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tab.set_user_agent(USER_AGENT, Some("he-IL,he;q=0.9,en-US;q=0.8"), Some("Win32"))
            .context("Failed to set user agent")?;

        Ok(Self { _browser: browser, tab })
    }
}

#[async_trait]
impl RenderSurface for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        debug!("Navigating to {url}");
        self.tab.navigate_to(url).context("Navigation failed")?;
        self.tab
            .wait_until_navigated()
            .context("Page never finished navigating")?;
        // Fingerprint patch must land before any card extraction runs.
        let _ = self.tab.evaluate(STEALTH_SCRIPT, false);
        Ok(())
    }

    async fn settle(&mut self, wait: Duration) -> Result<()> {
        tokio::time::sleep(wait).await;
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<()> {
        self.tab.evaluate(script, false).context("Script evaluation failed")?;
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        // find_elements errors when nothing matches; an empty page is a
        // normal answer here, not a failure.
        Ok(self.tab.find_elements(selector).map(|els| els.len()).unwrap_or(0))
    }

    async fn scroll_last_into_view(&mut self, selector: &str) -> Result<()> {
        let elements = self
            .tab
            .find_elements(selector)
            .context("No rendered elements to scroll to")?;
        if let Some(last) = elements.last() {
            last.scroll_into_view().context("Scroll into view failed")?;
        }
        Ok(())
    }

    async fn marker_visible(&mut self, xpath: &str) -> Result<bool> {
        Ok(self.tab.find_element_by_xpath(xpath).is_ok())
    }

    async fn content(&mut self) -> Result<String> {
        let result = self
            .tab
            .evaluate("document.documentElement.outerHTML", false)
            .context("Failed to read rendered DOM")?;
        let html = result
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default();
        Ok(html)
    }
}

/// Launches one fresh Chrome session per scrape stage.
pub struct ChromeProvider {
    headless: bool,
}

impl ChromeProvider {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl SurfaceProvider for ChromeProvider {
    async fn open(&self) -> Result<Box<dyn RenderSurface>> {
        let session = ChromeSession::launch(self.headless)?;
        Ok(Box::new(session))
    }
}
