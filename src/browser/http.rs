//! Script-less engine: plain HTTP GETs with a browser user agent.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::redirect;
use url::Url;

use super::{Browser, Session, contains, link_target};

const MAX_REDIRECTS: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
pub struct HttpBrowser;

impl HttpBrowser {
    pub fn new() -> Self {
        Self
    }
}

fn build_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    let redirect_policy = redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("Too many redirects (>100)")
        } else {
            attempt.follow()
        }
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(user_agent)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_session(&self, user_agent: &str) -> Result<Box<dyn Session>> {
        let client = build_client(user_agent).context("failed to build HTTP client")?;
        Ok(Box::new(HttpSession {
            client,
            url: None,
            html: String::new(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

pub struct HttpSession {
    client: reqwest::Client,
    url: Option<Url>,
    html: String,
}

impl HttpSession {
    /// Resolve `target` against the current page, if any.
    fn resolve(&self, target: &str) -> Result<Url> {
        let url = match &self.url {
            Some(base) => base.join(target),
            None => Url::parse(target),
        };
        url.with_context(|| format!("invalid URL '{target}'"))
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        let url = self.resolve(url)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()?;
        let final_url = response.url().clone();
        self.html = response.text().await.context("failed to read response body")?;
        self.url = Some(final_url);
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<()> {
        // Static documents never change, so there is nothing to wait for.
        if contains(&self.html, selector)? {
            Ok(())
        } else {
            bail!("'{selector}' not present in the document")
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
        Ok(())
    }
}
