//! # niantsai_scrape
//!
//! A batch pipeline that walks a list of vendor pages for holiday meal sets
//! (年菜), fetches each page through a scraping service, asks an AI
//! extraction service for a structured plan draft, and checkpoints the run
//! record as JSON after every URL.
//!
//! ## Usage
//!
//! ```sh
//! niantsai_scrape -u data/2026-niantsai-urls-clean.txt -o data/scrape-results.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Source**: read the URL list, dropping blanks and `#` comments
//! 2. **Fetching**: scrape each page via the fetch endpoint (or directly)
//! 3. **Extraction**: post the content and hints to the extraction endpoint
//! 4. **Checkpoint**: rewrite the run record, then pause before the next URL
//!
//! URLs are processed one at a time. Per-URL failures are recorded and the
//! run moves on; only I/O failures on the inputs or the output abort it.

use std::error::Error;
use std::time::Instant;

use chrono::Local;
use clap::Parser;
use itertools::Itertools;
use reqwest::Client;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod errors;
mod hints;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod sources;
mod utils;

use api::ExtractClient;
use cli::Cli;
use config::PipelineConfig;
use errors::PipelineError;
use outputs::JsonFileSink;
use pipeline::{Pipeline, resume_from};
use scrapers::{DirectFetcher, FetchRouter, ServiceFetcher};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = Instant::now();
    let started_at = Local::now();
    info!(started_at = %started_at.format("%Y-%m-%d %H:%M:%S"), "niantsai_scrape starting up");

    let args = Cli::parse();
    debug!(urls = %args.urls.display(), output = %args.output.display(), "Parsed CLI arguments");

    // ---- Config ----
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).await?,
        None => PipelineConfig::default(),
    };
    args.apply(&mut config);
    let config_path = args.config.clone().unwrap_or_default();
    config.validate().map_err(|message| PipelineError::Config {
        path: config_path.clone(),
        message,
    })?;
    let endpoint_err = |message| PipelineError::Config {
        path: config_path.clone(),
        message,
    };
    let fetch_endpoint = config.fetch_endpoint().map_err(endpoint_err)?;
    let extract_endpoint = config.extract_endpoint().map_err(endpoint_err)?;
    info!(
        services = %config.services.iter().join(" -> "),
        %fetch_endpoint,
        %extract_endpoint,
        max_attempts = config.retry.max_attempts,
        skip_non_product = config.skip_non_product,
        "Configuration ready"
    );

    // ---- Input ----
    let urls = sources::load_urls(&args.urls).await?;

    // ---- Output ----
    let mut sink = JsonFileSink::new(&args.output);
    if let Err(e) = sink.prepare().await {
        error!(
            path = %args.output.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }
    let prior = if args.resume {
        match sink.load().await? {
            Some(entries) => resume_from(&urls, entries, sink.path())?,
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    // ---- Clients ----
    let fetch_client = Client::builder().timeout(config.fetch_timeout()).build()?;
    let extract_client = Client::builder().timeout(config.extract_timeout()).build()?;

    let fetcher = FetchRouter {
        endpoint: ServiceFetcher::new(
            fetch_client.clone(),
            fetch_endpoint,
            config.api_keys.clone(),
        ),
        direct: DirectFetcher::new(fetch_client, config.content_limit),
    };
    let extractor = ExtractClient::new(extract_client, extract_endpoint);

    // ---- Run ----
    let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
        .run(&urls, prior, args.output.clone())
        .await?;

    let elapsed = start_time.elapsed();
    info!(
        success = summary.success_count,
        failed = summary.fail_count,
        skipped = summary.skipped_count,
        total = summary.total_urls,
        output = %summary.output_path.display(),
        run_elapsed = ?summary.elapsed,
        "Run summary"
    );
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        finished_at = %Local::now().format("%Y-%m-%d %H:%M:%S"),
        "Execution complete"
    );

    Ok(())
}
