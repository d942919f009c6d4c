use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.amazon.in";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_RETRIES: usize = 1;
pub const ASIN_COLUMN: &str = "ASIN";

pub const USER_AGENTS: [&str; 2] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

/// Knobs shared by the collector and the detail scraper.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    /// Number of identifiers fetched at the same time.
    pub workers: usize,
    /// Total tries per identifier, first one included. Never below 1.
    pub attempts: usize,
    pub retry_delay: Duration,
    /// Pause after clicking "next page" before reading the new results.
    pub page_delay: Duration,
    /// Random pause after a detail page loads is drawn from this range.
    pub settle_min: Duration,
    pub settle_max: Duration,
    pub scroll_pause: Duration,
    pub load_timeout: Duration,
    pub user_agents: Vec<String>,
    /// Stop paginating after this many result pages. `None` walks until the
    /// next-page control disappears.
    pub max_pages: Option<usize>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            workers: DEFAULT_WORKERS,
            attempts: DEFAULT_RETRIES + 1,
            retry_delay: Duration::from_secs(3),
            page_delay: Duration::from_secs(3),
            settle_min: Duration::from_secs(2),
            settle_max: Duration::from_secs(4),
            scroll_pause: Duration::from_secs(2),
            load_timeout: Duration::from_secs(10),
            user_agents: USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            max_pages: None,
        }
    }
}

impl ScrapeConfig {
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.attempts = retries + 1;
        self
    }

    pub fn search_url(&self, query: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(&format!("{}/s", self.base()), &[("k", query)])
    }

    pub fn product_url(&self, asin: &str) -> String {
        format!("{}/dp/{}", self.base(), asin)
    }

    pub fn random_user_agent(&self) -> &str {
        self.user_agents
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or(USER_AGENTS[0])
    }

    pub fn settle_delay(&self) -> Duration {
        if self.settle_max <= self.settle_min {
            return self.settle_min;
        }
        let secs = rand::thread_rng()
            .gen_range(self.settle_min.as_secs_f64()..self.settle_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Same settings with every sleep removed.
    #[cfg(test)]
    pub fn immediate(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            retry_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            settle_min: Duration::ZERO,
            settle_max: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            load_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }
}
