//! Client for the fetch endpoint.
//!
//! The endpoint hides the actual scraping backends (a headless browser for
//! `local`, Jina Reader, Firecrawl, the Python crawlers) behind one
//! `POST {url, service}` call that answers with normalized page content and
//! its hints.

use std::time::Instant;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{PageFetcher, ScraperService};
use crate::config::ApiKeys;
use crate::errors::PipelineError;
use crate::models::ScrapedPage;

#[derive(Debug, Serialize)]
struct FetchRequest<'a> {
    url: &'a str,
    service: ScraperService,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    success: bool,
    data: Option<ScrapedPage>,
    error: Option<String>,
}

/// Fetches pages by asking the fetch endpoint.
#[derive(Debug, Clone)]
pub struct ServiceFetcher {
    client: Client,
    endpoint: Url,
    keys: ApiKeys,
}

impl ServiceFetcher {
    pub fn new(client: Client, endpoint: Url, keys: ApiKeys) -> Self {
        Self {
            client,
            endpoint,
            keys,
        }
    }
}

impl PageFetcher for ServiceFetcher {
    #[instrument(level = "info", skip_all, fields(%url, %service))]
    async fn fetch(
        &self,
        url: &Url,
        service: ScraperService,
    ) -> Result<ScrapedPage, PipelineError> {
        let key = self.keys.for_service(service);
        if service.requires_api_key() && key.is_none() {
            warn!("Service needs an API key but none is configured");
            return Err(PipelineError::MissingApiKey { service });
        }

        let mut request = self.client.post(self.endpoint.clone()).json(&FetchRequest {
            url: url.as_str(),
            service,
        });
        if let Some(key) = key {
            request = request.bearer_auth(key);
        }

        let t0 = Instant::now();
        let response = request.send().await.map_err(|e| PipelineError::Fetch {
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Fetch endpoint returned an error status"
            );
            return Err(PipelineError::FetchHttp {
                status: status.as_u16(),
            });
        }

        let body: FetchResponse = response.json().await.map_err(|e| PipelineError::Fetch {
            message: e.to_string(),
        })?;

        match (body.success, body.data) {
            (true, Some(page)) => {
                debug!(
                    content_length = page.content_length,
                    images = page.images.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Fetched page"
                );
                Ok(page)
            }
            _ => Err(PipelineError::Fetch {
                message: body.error.unwrap_or_else(|| "scrape failed".to_string()),
            }),
        }
    }
}
