mod archiver;
mod browser;
mod collector;
mod config;
mod detail;
mod error;
mod models;
mod parser;

use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use archiver::OutputFormat;
use browser::Backend;
use config::{ASIN_COLUMN, DEFAULT_RETRIES, DEFAULT_WORKERS, ScrapeConfig};

#[derive(Parser)]
#[command(
    name = "amazon_product_archiver",
    about = "Collect product identifiers from search results and archive their detail pages",
    version
)]
struct Cli {
    /// Storefront root; search and product addresses are built from it.
    #[arg(long, env = "AMAZON_BASE_URL", default_value = config::DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Page rendering engine.
    #[arg(long, value_enum, default_value_t = Backend::Chromium, global = true)]
    backend: Backend,

    /// Show the browser window instead of running headless.
    #[arg(long, global = true)]
    headful: bool,

    /// File that collects error-level events.
    #[arg(long, default_value = "scraping_errors.log", global = true)]
    log_file: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the store and save every product identifier found
    Collect {
        /// Search terms; prompted for when omitted
        query: Option<String>,
        #[arg(short, long, default_value = "asin_codes.csv")]
        output: PathBuf,
        /// Stop after this many result pages
        #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
        max_pages: Option<usize>,
    },
    /// Scrape the detail page of every identifier in a CSV file
    Scrape {
        #[arg(short, long, default_value = "asin_codes.csv")]
        input: PathBuf,
        #[arg(short, long, default_value = "scraped_amazon_products.csv")]
        output: PathBuf,
        /// Column holding the identifiers
        #[arg(long, default_value = ASIN_COLUMN)]
        column: String,
        /// Pages fetched at the same time
        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
        /// Extra attempts for a page that fails to load
        #[arg(long, default_value_t = DEFAULT_RETRIES)]
        retries: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_file)?;

    let config = ScrapeConfig {
        base_url: cli.base_url.clone(),
        ..ScrapeConfig::default()
    };

    match cli.command {
        Commands::Collect {
            query,
            output,
            max_pages,
        } => {
            let query = match query {
                Some(q) => q,
                None => prompt("Enter the product name: ")?,
            };
            let config = ScrapeConfig { max_pages, ..config };
            run_collect(cli.backend, cli.headful, &query, &output, &config).await
        }
        Commands::Scrape {
            input,
            output,
            column,
            workers,
            retries,
            format,
        } => {
            let config = ScrapeConfig { workers, ..config }.with_retries(retries);
            run_scrape(cli.backend, cli.headful, &input, &column, &output, format, &config).await
        }
    }
}

fn init_tracing(level: &str, log_file: &Path) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(Targets::new().with_target(env!("CARGO_CRATE_NAME"), Level::ERROR)),
        )
        .init();
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let query = line.trim().to_string();
    if query.is_empty() {
        bail!("a product name is required");
    }
    Ok(query)
}

async fn run_collect(
    backend: Backend,
    headful: bool,
    query: &str,
    output: &Path,
    config: &ScrapeConfig,
) -> Result<()> {
    let browser = browser::launch(backend, !headful).await?;
    let asins = collector::collect_asins(browser.as_ref(), query, config).await;
    if let Err(e) = browser.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }
    let asins = asins?;

    if asins.is_empty() {
        info!("No ASIN codes found.");
        return Ok(());
    }
    archiver::write_asins(output, ASIN_COLUMN, &asins)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!("Scraped {} ASIN codes.", asins.len());
    info!("ASIN codes saved to '{}'.", output.display());
    Ok(())
}

async fn run_scrape(
    backend: Backend,
    headful: bool,
    input: &Path,
    column: &str,
    output: &Path,
    format: OutputFormat,
    config: &ScrapeConfig,
) -> Result<()> {
    let asins = archiver::read_asins(input, column)
        .with_context(|| format!("failed to read identifiers from {}", input.display()))?;
    info!("Loaded {} identifiers from '{}'.", asins.len(), input.display());

    let browser = browser::launch(backend, !headful).await?;
    let records = detail::scrape_all(browser.as_ref(), &asins, config).await;
    if let Err(e) = browser.shutdown().await {
        warn!("browser shutdown failed: {e:#}");
    }

    archiver::write_products(output, &records, format)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        "Saved {} of {} products to '{}'.",
        records.len(),
        asins.len(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_must_be_positive() {
        assert!(Cli::try_parse_from(["amazon_product_archiver", "collect", "cable", "--max-pages", "0"]).is_err());

        let cli = Cli::try_parse_from(["amazon_product_archiver", "collect", "cable", "--max-pages", "2"]).unwrap();
        match cli.command {
            Commands::Collect { max_pages, .. } => assert_eq!(max_pages, Some(2)),
            Commands::Scrape { .. } => panic!("expected collect"),
        }
    }
}
