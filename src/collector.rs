use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::browser::{Browser, Session};
use crate::config::ScrapeConfig;
use crate::models::Asin;
use crate::parser;

/// Search for `query` and return every identifier found, in discovery order.
///
/// A browser failure part-way through is logged and ends the walk; whatever
/// was collected up to that point is returned.
pub async fn collect_asins(
    browser: &dyn Browser,
    query: &str,
    config: &ScrapeConfig,
) -> Result<Vec<Asin>> {
    let search_url = config.search_url(query)?;
    let mut session = browser.new_session(config.random_user_agent()).await?;

    let mut asins = Vec::new();
    if let Err(e) = walk_result_pages(session.as_mut(), search_url.as_str(), config, &mut asins).await {
        error!("An error occurred: {e:#}");
    }
    if let Err(e) = session.close().await {
        warn!("failed to close search session: {e:#}");
    }

    Ok(asins)
}

async fn walk_result_pages(
    session: &mut dyn Session,
    search_url: &str,
    config: &ScrapeConfig,
    asins: &mut Vec<Asin>,
) -> Result<()> {
    session.goto(search_url).await?;

    let mut page_number = 1;
    loop {
        info!("Scraping page {page_number}...");
        let html = session.html().await?;
        let found = parser::extract_asins(&html);
        debug!(page = page_number, found = found.len(), "identifiers on page");
        asins.extend(found);

        if config.max_pages.is_some_and(|max| page_number >= max) {
            info!("Page limit of {page_number} reached.");
            return Ok(());
        }
        if !parser::has_next_page(&html) || !session.click(parser::NEXT_PAGE_SELECTOR).await? {
            info!("No more pages found.");
            return Ok(());
        }

        sleep(config.page_delay).await;
        page_number += 1;
    }
}
