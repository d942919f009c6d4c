//! Browser abstraction used by the collector and the detail scraper.
//!
//! `Browser` opens isolated sessions; a `Session` is a single tab that is
//! driven through one page's lifetime and then closed. Two engines are
//! provided: headless Chromium and a plain HTTP client for pages that do
//! not need scripting.

pub mod chromium;
pub mod http;

use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use scraper::{Html, Selector};

/// Which engine renders pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    Chromium,
    Http,
}

/// A browser engine that can open sessions.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a fresh session presenting the given user agent.
    async fn new_session(&self, user_agent: &str) -> Result<Box<dyn Session>>;
    /// Shut down the engine.
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser tab.
#[async_trait]
pub trait Session: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    /// Wait until an element matching `selector` exists.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<()>;
    /// Serialized DOM of the current page.
    async fn html(&mut self) -> Result<String>;
    /// Click the first element matching `selector`. Returns `false` when no
    /// such element exists.
    async fn click(&mut self, selector: &str) -> Result<bool>;
    /// Scroll until the document height stops growing.
    async fn scroll_to_bottom(&mut self, pause: Duration) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;
}

pub async fn launch(backend: Backend, headless: bool) -> Result<Box<dyn Browser>> {
    match backend {
        Backend::Chromium => Ok(Box::new(chromium::ChromiumBrowser::launch(headless).await?)),
        Backend::Http => Ok(Box::new(http::HttpBrowser::new())),
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{css}': {e:?}"))
}

/// `href` of the first element matching `selector`, for engines that follow
/// links instead of dispatching clicks. `None` when nothing matches.
pub(crate) fn link_target(html: &str, selector: &str) -> Result<Option<String>> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    let Some(element) = doc.select(&sel).next() else {
        return Ok(None);
    };
    match element.value().attr("href") {
        Some(href) => Ok(Some(href.to_string())),
        None => bail!("'{selector}' has no href to follow"),
    }
}

pub(crate) fn contains(html: &str, selector: &str) -> Result<bool> {
    let sel = parse_selector(selector)?;
    Ok(Html::parse_document(html).select(&sel).next().is_some())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory browser serving fixture pages by URL.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Fixtures {
        pages: Mutex<HashMap<String, String>>,
        /// Remaining forced `goto` failures per URL.
        failures: Mutex<HashMap<String, usize>>,
        opened: AtomicUsize,
        closed: AtomicUsize,
        user_agents: Mutex<Vec<String>>,
    }

    impl Fixtures {
        fn fetch(&self, url: &str) -> Result<String> {
            if let Some(left) = self.failures.lock().unwrap().get_mut(url) {
                if *left > 0 {
                    *left -= 1;
                    bail!("forced failure for {url}");
                }
            }
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("no fixture for {url}"))
        }
    }

    #[derive(Default, Clone)]
    pub struct FakeBrowser {
        state: Arc<Fixtures>,
    }

    impl FakeBrowser {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(self, url: &str, html: &str) -> Self {
            self.state
                .pages
                .lock()
                .unwrap()
                .insert(url.to_string(), html.to_string());
            self
        }

        /// Make the next `times` visits to `url` fail.
        pub fn failing(self, url: &str, times: usize) -> Self {
            self.state
                .failures
                .lock()
                .unwrap()
                .insert(url.to_string(), times);
            self
        }

        pub fn sessions_opened(&self) -> usize {
            self.state.opened.load(Ordering::SeqCst)
        }

        pub fn sessions_closed(&self) -> usize {
            self.state.closed.load(Ordering::SeqCst)
        }

        pub fn user_agents(&self) -> Vec<String> {
            self.state.user_agents.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Browser for FakeBrowser {
        async fn new_session(&self, user_agent: &str) -> Result<Box<dyn Session>> {
            self.state.opened.fetch_add(1, Ordering::SeqCst);
            self.state
                .user_agents
                .lock()
                .unwrap()
                .push(user_agent.to_string());
            Ok(Box::new(FakeSession {
                state: Arc::clone(&self.state),
                html: String::new(),
            }))
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeSession {
        state: Arc<Fixtures>,
        html: String,
    }

    #[async_trait]
    impl Session for FakeSession {
        async fn goto(&mut self, url: &str) -> Result<()> {
            self.html = self.state.fetch(url)?;
            Ok(())
        }

        async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<()> {
            if contains(&self.html, selector)? {
                Ok(())
            } else {
                bail!("'{selector}' never appeared")
            }
        }

        async fn html(&mut self) -> Result<String> {
            Ok(self.html.clone())
        }

        async fn click(&mut self, selector: &str) -> Result<bool> {
            match link_target(&self.html, selector)? {
                Some(href) => {
                    self.goto(&href).await?;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn scroll_to_bottom(&mut self, _pause: Duration) -> Result<()> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
