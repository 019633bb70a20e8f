//! Page fetchers: turn a vendor URL into normalized [`ScrapedPage`] content.
//!
//! A fetch is addressed by service name. Two implementations exist:
//!
//! | Service | Module | Method | Credentials |
//! |---------|--------|--------|-------------|
//! | `local`, `crawl4ai`, `scrapegraph` | [`service`] | fetch endpoint | none |
//! | `jina` | [`service`] | fetch endpoint | optional key |
//! | `firecrawl` | [`service`] | fetch endpoint | key required |
//! | `direct` | [`direct`] | in-process HTML scrape | none |
//!
//! [`FetchRouter`] picks the implementation for a service so the
//! orchestrator can walk a fallback chain without caring which is which.
//!
//! URLs arrive already parsed; validation belongs to the caller.

pub mod direct;
pub mod service;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::PipelineError;
use crate::models::ScrapedPage;

pub use direct::DirectFetcher;
pub use service::ServiceFetcher;

/// Backend that performs the page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScraperService {
    Local,
    Jina,
    Firecrawl,
    Crawl4ai,
    Scrapegraph,
    Direct,
}

impl ScraperService {
    pub const ALL: [ScraperService; 6] = [
        ScraperService::Local,
        ScraperService::Jina,
        ScraperService::Firecrawl,
        ScraperService::Crawl4ai,
        ScraperService::Scrapegraph,
        ScraperService::Direct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScraperService::Local => "local",
            ScraperService::Jina => "jina",
            ScraperService::Firecrawl => "firecrawl",
            ScraperService::Crawl4ai => "crawl4ai",
            ScraperService::Scrapegraph => "scrapegraph",
            ScraperService::Direct => "direct",
        }
    }

    /// Whether the backend refuses to work without an API key.
    pub fn requires_api_key(&self) -> bool {
        matches!(self, ScraperService::Firecrawl)
    }
}

impl fmt::Display for ScraperService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScraperService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ScraperService::ALL
            .into_iter()
            .find(|svc| svc.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown scraper service {s:?} (expected one of: {})",
                    ScraperService::ALL.map(|svc| svc.as_str()).join(", ")
                )
            })
    }
}

/// Fetch one page through a named backend.
///
/// Implementations issue at most one request per call; retries and fallback
/// are the caller's concern.
pub trait PageFetcher {
    async fn fetch(&self, url: &Url, service: ScraperService)
    -> Result<ScrapedPage, PipelineError>;
}

/// Routes `direct` to the in-process fetcher and every other service to the
/// fetch endpoint.
#[derive(Debug)]
pub struct FetchRouter {
    pub endpoint: ServiceFetcher,
    pub direct: DirectFetcher,
}

impl PageFetcher for FetchRouter {
    async fn fetch(
        &self,
        url: &Url,
        service: ScraperService,
    ) -> Result<ScrapedPage, PipelineError> {
        match service {
            ScraperService::Direct => self.direct.fetch(url, service).await,
            _ => self.endpoint.fetch(url, service).await,
        }
    }
}
