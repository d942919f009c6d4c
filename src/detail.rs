use anyhow::Result;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::{Browser, Session};
use crate::config::ScrapeConfig;
use crate::models::{Asin, ProductRecord};
use crate::parser;

pub async fn scrape_all(
    browser: &dyn Browser,
    asins: &[Asin],
    config: &ScrapeConfig,
) -> Vec<ProductRecord> {
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let progress = progress_bar(asins.len());

    stream::iter(asins)
        .for_each_concurrent(config.workers.max(1), |asin| {
            let results_tx = results_tx.clone();
            let progress = progress.clone();
            async move {
                if let Some(record) = scrape_product(browser, asin, config).await {
                    let _ = results_tx.send(record);
                }
                progress.inc(1);
            }
        })
        .await;

    drop(results_tx);
    progress.finish_and_clear();

    let mut records = Vec::with_capacity(asins.len());
    while let Some(record) = results_rx.recv().await {
        records.push(record);
    }
    info!(requested = asins.len(), scraped = records.len(), "detail scraping finished");
    records
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{msg}: {wide_bar} {pos}/{len} [{elapsed_precise}<{eta}]")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message("Scraping Amazon Products");
    bar
}

/// Scrape one identifier, retrying per the configured attempt budget.
/// `None` once every attempt has failed.
pub async fn scrape_product(
    browser: &dyn Browser,
    asin: &str,
    config: &ScrapeConfig,
) -> Option<ProductRecord> {
    let url = config.product_url(asin);
    let attempts = config.attempts.max(1);

    for attempt in 1..=attempts {
        match scrape_once(browser, &url, config).await {
            Ok(record) => return Some(record),
            Err(e) => {
                error!(url = %url, "Attempt {attempt} failed: {e:#}");
                if attempt < attempts {
                    info!(url = %url, "Retrying (attempt {}/{attempts})", attempt + 1);
                    sleep(config.retry_delay).await;
                }
            }
        }
    }

    error!(url = %url, "Failed to scrape after {attempts} attempts");
    None
}

async fn scrape_once(browser: &dyn Browser, url: &str, config: &ScrapeConfig) -> Result<ProductRecord> {
    let mut session = browser.new_session(config.random_user_agent()).await?;
    let rendered = render(session.as_mut(), url, config).await;
    if let Err(e) = session.close().await {
        warn!(url, "failed to close session: {e:#}");
    }
    Ok(parser::parse_product(url, &rendered?))
}

async fn render(session: &mut dyn Session, url: &str, config: &ScrapeConfig) -> Result<String> {
    session.goto(url).await?;
    session.wait_for("body", config.load_timeout).await?;
    sleep(config.settle_delay()).await;
    session.scroll_to_bottom(config.scroll_pause).await?;
    session.html().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::FakeBrowser;
    use crate::config::USER_AGENTS;
    use crate::models::PRICE_UNAVAILABLE;

    const BASE: &str = "https://shop.test";

    fn product_page(model: &str) -> String {
        format!(
            r#"<html><body>
                <div id="productOverview_feature_div"><table>
                  <tr><td>Model Name</td><td>{model}</td></tr>
                </table></div>
               </body></html>"#
        )
    }

    #[tokio::test]
    async fn drops_identifiers_that_never_load() {
        let browser = FakeBrowser::new()
            .page("https://shop.test/dp/P1", &product_page("One"))
            .page("https://shop.test/dp/P3", &product_page("Three"));
        let asins: Vec<Asin> = ["P1", "P2", "P3"].map(String::from).to_vec();

        let mut records = scrape_all(&browser, &asins, &ScrapeConfig::immediate(BASE)).await;

        assert!(records.len() <= asins.len());
        records.sort_by(|a, b| a.url.cmp(&b.url));
        let models: Vec<_> = records.iter().map(|r| r.model_name.as_str()).collect();
        assert_eq!(models, vec!["One", "Three"]);
        assert_eq!(records[0].url, "https://shop.test/dp/P1");
        assert_eq!(records[0].discounted_price, PRICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn retries_once_after_a_failed_attempt() {
        let browser = FakeBrowser::new()
            .page("https://shop.test/dp/R1", &product_page("Retry"))
            .failing("https://shop.test/dp/R1", 1);

        let record = scrape_product(&browser, "R1", &ScrapeConfig::immediate(BASE)).await;

        assert_eq!(record.unwrap().model_name, "Retry");
        assert_eq!(browser.sessions_opened(), 2);
        assert_eq!(browser.sessions_closed(), 2);
    }

    #[tokio::test]
    async fn gives_up_when_attempts_are_exhausted() {
        let browser = FakeBrowser::new()
            .page("https://shop.test/dp/R2", &product_page("Never"))
            .failing("https://shop.test/dp/R2", 2);

        let record = scrape_product(&browser, "R2", &ScrapeConfig::immediate(BASE)).await;

        assert!(record.is_none());
        assert_eq!(browser.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn no_retry_budget_means_single_attempt() {
        let browser = FakeBrowser::new()
            .page("https://shop.test/dp/R3", &product_page("Once"))
            .failing("https://shop.test/dp/R3", 1);
        let config = ScrapeConfig::immediate(BASE).with_retries(0);

        assert!(scrape_product(&browser, "R3", &config).await.is_none());
        assert_eq!(browser.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn every_session_uses_a_rotated_user_agent() {
        let browser = FakeBrowser::new()
            .page("https://shop.test/dp/U1", &product_page("A"))
            .page("https://shop.test/dp/U2", &product_page("B"));
        let asins: Vec<Asin> = ["U1", "U2"].map(String::from).to_vec();

        scrape_all(&browser, &asins, &ScrapeConfig::immediate(BASE)).await;

        let agents = browser.user_agents();
        assert_eq!(agents.len(), 2);
        assert!(agents.iter().all(|ua| USER_AGENTS.contains(&ua.as_str())));
    }

    #[tokio::test]
    async fn empty_input_produces_no_records() {
        let browser = FakeBrowser::new();
        assert!(scrape_all(&browser, &[], &ScrapeConfig::immediate(BASE)).await.is_empty());
    }
}
