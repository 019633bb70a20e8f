//! AI extraction client with bounded exponential backoff.
//!
//! The extraction endpoint wraps whatever model turns page text into a plan
//! draft. This module provides:
//! - [`PlanExtractor`]: the seam the orchestrator calls through
//! - [`ExtractClient`]: the HTTP implementation
//! - [`with_backoff`]: the retry loop shared by the fetch and extract stages
//!
//! # Retry Strategy
//!
//! Attempts are capped by [`RetryPolicy::max_attempts`] (the first try
//! included). Between attempts the delay is
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Errors that cannot change on a second try (missing key, invalid URL) are
//! returned immediately.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::{Rng, rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::RetryPolicy;
use crate::errors::PipelineError;
use crate::models::{ExtractedPlan, Hints};

/// Message used when the service declines without saying why.
pub const DEFAULT_EXTRACT_ERROR: &str = "extraction failed";

/// Body sent to the extraction endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest<'a> {
    pub content: &'a str,
    pub images: &'a [String],
    pub hints: &'a Hints,
    pub url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    success: bool,
    data: Option<Value>,
    error: Option<String>,
}

/// Turn scraped content into a plan.
pub trait PlanExtractor {
    async fn extract(&self, request: &ExtractRequest<'_>) -> Result<ExtractedPlan, PipelineError>;
}

/// Calls the extraction endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct ExtractClient {
    client: Client,
    endpoint: Url,
}

impl ExtractClient {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

impl PlanExtractor for ExtractClient {
    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    async fn extract(&self, request: &ExtractRequest<'_>) -> Result<ExtractedPlan, PipelineError> {
        let t0 = Instant::now();
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| PipelineError::Extract {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Extraction endpoint returned an error status"
            );
            return Err(PipelineError::ExtractHttp {
                status: status.as_u16(),
            });
        }

        let body: ExtractResponse = response.json().await.map_err(|e| PipelineError::Extract {
            message: e.to_string(),
        })?;
        debug!(
            success = body.success,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Extraction response received"
        );

        let declined = || {
            PipelineError::ExtractionDeclined(
                body.error
                    .clone()
                    .unwrap_or_else(|| DEFAULT_EXTRACT_ERROR.to_string()),
            )
        };
        if !body.success {
            return Err(declined());
        }
        match body.data.as_ref().and_then(plan_from_value) {
            Some(plan) => Ok(plan),
            None => Err(declined()),
        }
    }
}

/// Read the `data` payload: a plan object, or the first of several.
fn plan_from_value(value: &Value) -> Option<ExtractedPlan> {
    match value {
        Value::Object(map) => Some(ExtractedPlan::from_map(map.clone())),
        Value::Array(items) => {
            if items.len() > 1 {
                info!(count = items.len(), "Extraction returned several plans; keeping the first");
            }
            items.iter().find(|v| v.is_object()).and_then(plan_from_value)
        }
        _ => None,
    }
}

/// Delay before attempt `attempt + 1`, `attempt` counting from 1.
pub fn backoff_delay(policy: &RetryPolicy, attempt: usize) -> Duration {
    let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let delay = policy
        .base_delay()
        .saturating_mul(2u32.saturating_pow(exp))
        .min(policy.max_delay());
    if delay.is_zero() {
        return delay;
    }
    let jitter_ms: u64 = rng().random_range(0..=250);
    delay + Duration::from_millis(jitter_ms)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. Returns the last error.
#[instrument(level = "info", skip_all, fields(op = label))]
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let total_t0 = Instant::now();
    let mut attempt = 0usize;

    loop {
        let attempt_t0 = Instant::now();
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                let attempt_dt = attempt_t0.elapsed();
                let total_dt = total_t0.elapsed();

                if !e.is_retryable() || attempt >= policy.max_attempts {
                    if attempt > 1 {
                        error!(
                            attempt,
                            max = policy.max_attempts,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "Exhausted retries"
                        );
                    }
                    return Err(e);
                }

                let delay = backoff_delay(policy, attempt);
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    ?delay,
                    error = %e,
                    "Attempt failed; backing off"
                );
                sleep(delay).await;
            }
        }
    }
}
