//! Command-line interface definitions.
//!
//! Every flag has a matching key in the YAML config; flags win when both
//! are given. API keys can also come from the environment.

use std::path::PathBuf;

use clap::Parser;

use crate::config::PipelineConfig;
use crate::scrapers::ScraperService;

/// Batch-scrape holiday meal set pages and extract plan drafts.
///
/// # Examples
///
/// ```sh
/// # Default input and output paths against a local dev server
/// niantsai_scrape
///
/// # Try jina first, fall back to the local scraper, retry transient errors
/// niantsai_scrape -u urls.txt -o out.json --service jina --service local --max-attempts 3
///
/// # Continue an interrupted run
/// niantsai_scrape --resume
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL list, one per line; blank lines and `#` comments are ignored
    #[arg(short, long, default_value = "data/2026-niantsai-urls-clean.txt")]
    pub urls: PathBuf,

    /// Run record written after every URL
    #[arg(short, long, default_value = "data/scrape-results.json")]
    pub output: PathBuf,

    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Origin serving /api/scrape and /api/ai-extract
    #[arg(long)]
    pub base_url: Option<String>,

    /// Fetch service to use; repeat to build a fallback chain
    #[arg(short, long = "service")]
    pub services: Vec<ScraperService>,

    /// Attempts per service and per extraction (1 disables retries)
    #[arg(long)]
    pub max_attempts: Option<usize>,

    /// Pause after a failed fetch, in milliseconds
    #[arg(long)]
    pub fetch_failure_delay_ms: Option<u64>,

    /// Pause after a URL that reached extraction, in milliseconds
    #[arg(long)]
    pub step_delay_ms: Option<u64>,

    /// Continue after the entries already in the output file
    #[arg(long)]
    pub resume: bool,

    /// Record search and listing pages as skipped instead of fetching them
    #[arg(long)]
    pub skip_non_product: bool,

    /// Jina Reader API key
    #[arg(long, env = "JINA_API_KEY", hide_env_values = true)]
    pub jina_api_key: Option<String>,

    /// Firecrawl API key
    #[arg(long, env = "FIRECRAWL_API_KEY", hide_env_values = true)]
    pub firecrawl_api_key: Option<String>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if !self.services.is_empty() {
            config.services = self.services.clone();
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = self.fetch_failure_delay_ms {
            config.fetch_failure_delay_ms = ms;
        }
        if let Some(ms) = self.step_delay_ms {
            config.step_delay_ms = ms;
        }
        if self.skip_non_product {
            config.skip_non_product = true;
        }
        if let Some(key) = &self.jina_api_key {
            config.api_keys.jina = Some(key.clone());
        }
        if let Some(key) = &self.firecrawl_api_key {
            config.api_keys.firecrawl = Some(key.clone());
        }
    }
}
