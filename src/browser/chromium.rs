//! Headless Chromium engine built on chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::{Browser, Session};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Locate a Chrome or Chromium executable.
pub fn find_chrome() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_PATH") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let common: &[&str] = if cfg!(target_os = "macos") {
        &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &["/usr/bin/google-chrome", "/usr/bin/chromium", "/snap/bin/chromium"]
    };
    common.iter().map(PathBuf::from).find(|p| p.exists())
}

/// One Chromium process per run; every session is a separate tab.
pub struct ChromiumBrowser {
    browser: Mutex<CdpBrowser>,
    handler: JoinHandle<()>,
}

impl ChromiumBrowser {
    pub async fn launch(headless: bool) -> Result<Self> {
        let chrome_path = find_chrome().context("Chrome not found. Install it or set CHROME_PATH.")?;
        info!(path = %chrome_path.display(), "launching Chromium");

        let builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--start-maximized");
        let builder = if headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_session(&self, user_agent: &str) -> Result<Box<dyn Session>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to open a new tab")?;
        page.set_user_agent(SetUserAgentOverrideParams::new(user_agent))
            .await
            .context("failed to set user agent")?;
        Ok(Box::new(ChromiumSession { page }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("failed to close Chromium cleanly: {e}");
        }
        self.handler.abort();
        Ok(())
    }
}

pub struct ChromiumSession {
    page: Page,
}

impl ChromiumSession {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .with_context(|| format!("script failed: {script}"))?
            .into_value()
            .map_err(|e| anyhow!("unexpected script result: {e:?}"))
    }
}

#[async_trait]
impl Session for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("timed out after {timeout:?} waiting for '{selector}'");
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn html(&mut self) -> Result<String> {
        self.page.content().await.context("failed to read page HTML")
    }

    async fn click(&mut self, selector: &str) -> Result<bool> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .with_context(|| format!("failed to click '{selector}'"))?;
        // Clicks that only update the page in place never navigate.
        if let Err(e) = self.page.wait_for_navigation().await {
            debug!("no navigation after clicking '{selector}': {e}");
        }
        Ok(true)
    }

    async fn scroll_to_bottom(&mut self, pause: Duration) -> Result<()> {
        let mut last_height: f64 = self.eval("document.body.scrollHeight").await?;
        loop {
            self.page
                .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .context("failed to scroll")?;
            sleep(pause).await;
            let height: f64 = self.eval("document.body.scrollHeight").await?;
            if height == last_height {
                return Ok(());
            }
            last_height = height;
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await.context("failed to close tab")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn renders_and_paginates_data_pages() {
        let browser = ChromiumBrowser::launch(true)
            .await
            .expect("failed to launch Chromium");
        let mut session = browser
            .new_session(crate::config::USER_AGENTS[0])
            .await
            .expect("failed to open session");

        session
            .goto("data:text/html,<div class='s-main-slot'><div data-asin='B0TEST0001'></div></div>")
            .await
            .expect("navigation failed");
        session
            .wait_for("body", Duration::from_secs(10))
            .await
            .expect("body never appeared");
        session
            .scroll_to_bottom(Duration::from_millis(50))
            .await
            .expect("scroll failed");

        let html = session.html().await.expect("html failed");
        assert_eq!(parser::extract_asins(&html), vec!["B0TEST0001"]);
        assert!(!session.click(parser::NEXT_PAGE_SELECTOR).await.expect("click failed"));

        session.close().await.expect("close failed");
        browser.shutdown().await.expect("shutdown failed");
    }

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn click_without_navigation_still_succeeds() {
        let browser = ChromiumBrowser::launch(true)
            .await
            .expect("failed to launch Chromium");
        let mut session = browser
            .new_session(crate::config::USER_AGENTS[0])
            .await
            .expect("failed to open session");

        session
            .goto("data:text/html,<button id='more' onclick=\"this.textContent='opened'\">more</button>")
            .await
            .expect("navigation failed");
        assert!(session.click("#more").await.expect("click failed"));
        assert!(session.html().await.expect("html failed").contains("opened"));

        session.close().await.expect("close failed");
        browser.shutdown().await.expect("shutdown failed");
    }
}
