//! Run configuration.
//!
//! Settings come from an optional YAML file and are then overridden by CLI
//! flags (see [`crate::cli::Cli::apply`]). The resulting [`PipelineConfig`]
//! is built once in `main` and handed to the fetchers, the extractor and the
//! orchestrator; nothing below `main` reads the process environment.
//!
//! ```yaml
//! base_url: http://localhost:4001
//! services: [jina, local]
//! fetch_failure_delay_ms: 1000
//! step_delay_ms: 8000
//! request_timeout_secs: 60
//! content_limit: 8000
//! skip_non_product: true
//! retry:
//!   max_attempts: 3
//!   base_delay_ms: 5000
//! api_keys:
//!   firecrawl: fc-...
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use url::Url;

use crate::errors::PipelineError;
use crate::hints::DEFAULT_CONTENT_LIMIT;
use crate::scrapers::ScraperService;

pub const DEFAULT_BASE_URL: &str = "http://localhost:4001";
pub const FETCH_PATH: &str = "/api/scrape";
pub const EXTRACT_PATH: &str = "/api/ai-extract";

/// Credentials for remote fetch backends.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub jina: Option<String>,
    pub firecrawl: Option<String>,
}

impl ApiKeys {
    pub fn for_service(&self, service: ScraperService) -> Option<&str> {
        match service {
            ScraperService::Jina => self.jina.as_deref(),
            ScraperService::Firecrawl => self.firecrawl.as_deref(),
            _ => None,
        }
    }
}

// Keys stay out of logs.
impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("jina", &self.jina.as_ref().map(|_| "***"))
            .field("firecrawl", &self.firecrawl.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Bounded retry with exponential backoff.
///
/// `max_attempts` counts the first try, so 1 disables retrying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 5000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// No retries, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Origin serving the fetch and extraction endpoints.
    pub base_url: String,
    /// Fetch services tried in order for each URL.
    pub services: Vec<ScraperService>,
    /// Pause after a URL whose fetch failed.
    pub fetch_failure_delay_ms: u64,
    /// Pause after a URL that reached extraction.
    pub step_delay_ms: u64,
    /// Fetch request timeout; extraction gets twice this.
    pub request_timeout_secs: u64,
    /// Character budget for content from the direct fetcher.
    pub content_limit: usize,
    /// Record search and listing pages as skipped instead of fetching them.
    pub skip_non_product: bool,
    pub retry: RetryPolicy,
    pub api_keys: ApiKeys,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            services: vec![ScraperService::Local],
            fetch_failure_delay_ms: 1000,
            step_delay_ms: 2000,
            request_timeout_secs: 60,
            content_limit: DEFAULT_CONTENT_LIMIT,
            skip_non_product: false,
            retry: RetryPolicy::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

impl PipelineConfig {
    /// Load settings from a YAML file; absent keys keep their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PipelineError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        let config: PipelineConfig =
            serde_yaml::from_str(&raw).map_err(|e| PipelineError::Config {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        info!("Loaded pipeline config");
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.services.is_empty() {
            return Err("at least one scraper service is required".to_string());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        self.fetch_endpoint()?;
        Ok(())
    }

    pub fn fetch_endpoint(&self) -> Result<Url, String> {
        self.endpoint(FETCH_PATH)
    }

    pub fn extract_endpoint(&self) -> Result<Url, String> {
        self.endpoint(EXTRACT_PATH)
    }

    fn endpoint(&self, path: &str) -> Result<Url, String> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| format!("invalid base_url {:?}: {e}", self.base_url))?;
        base.join(path)
            .map_err(|e| format!("invalid endpoint {path}: {e}"))
    }

    pub fn fetch_failure_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_failure_delay_ms)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.saturating_mul(2))
    }
}
