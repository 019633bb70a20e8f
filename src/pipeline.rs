//! The batch orchestrator: fetch, extract and checkpoint one URL at a time.
//!
//! Each URL goes through
//!
//! ```text
//! Pending -> Fetching -> FetchFailed
//!                     -> Fetched -> Extracting -> ExtractFailed
//!                                              -> Extracted
//! ```
//!
//! and ends in exactly one terminal [`Outcome`] (or `Skipped` when the
//! product-page filter is on). Fetch failures never reach the extractor.
//! Per-URL errors become run entries; only sink failures abort the run.
//!
//! URLs are processed strictly in order with one request in flight. The
//! downstream services are rate limited, so after each URL the orchestrator
//! sleeps before moving on: briefly after a failed fetch, longer after a URL
//! that reached extraction.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::api::{ExtractRequest, PlanExtractor, with_backoff};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::models::{Outcome, RunEntry, RunSummary, ScrapedPage};
use crate::outputs::ResultSink;
use crate::scrapers::{PageFetcher, ScraperService};
use crate::sources::is_product_url;
use crate::utils::truncate_for_log;

/// Error recorded for URLs dropped by the product-page filter.
pub const SKIPPED_REASON: &str = "not a product page; skipped";

pub struct Pipeline<'a, F, E, S> {
    fetcher: &'a F,
    extractor: &'a E,
    sink: &'a mut S,
    config: &'a PipelineConfig,
}

impl<'a, F, E, S> Pipeline<'a, F, E, S>
where
    F: PageFetcher,
    E: PlanExtractor,
    S: ResultSink,
{
    pub fn new(
        fetcher: &'a F,
        extractor: &'a E,
        sink: &'a mut S,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            sink,
            config,
        }
    }

    /// Process `urls` after the entries already in `prior`.
    ///
    /// `prior` must be a record from an earlier run over the same list (see
    /// [`resume_from`]); pass an empty vector to start fresh. The record is
    /// persisted after every URL.
    #[instrument(level = "info", skip_all, fields(total = urls.len(), resumed = prior.len()))]
    pub async fn run(
        &mut self,
        urls: &[String],
        prior: Vec<RunEntry>,
        output_path: PathBuf,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let total = urls.len();
        let mut record = prior;
        let start = record.len();

        if start > 0 {
            info!(start = start + 1, "Resuming from previous run record");
        }

        for (index, url) in urls.iter().enumerate().skip(start) {
            info!(
                progress = %format!("{}/{}", index + 1, total),
                url = %truncate_for_log(url, 60),
                "Processing URL"
            );

            let outcome = self.process(url).await;
            let pause = self.pause_after(&outcome);
            record.push(RunEntry::from_outcome(url.clone(), outcome));

            self.sink.persist(&record).await?;

            let succeeded = record.iter().filter(|e| e.success).count();
            let failed = record.iter().filter(|e| e.is_failure()).count();
            debug!(succeeded, failed, processed = record.len(), "Checkpoint written");

            if index + 1 < total && !pause.is_zero() {
                debug!(?pause, "Pacing before next URL");
                sleep(pause).await;
            }
        }

        Ok(RunSummary::from_entries(
            &record,
            total,
            output_path,
            started.elapsed(),
        ))
    }

    /// Drive one URL to its terminal outcome. Never fails: errors are data.
    #[instrument(level = "info", skip_all, fields(url = %raw))]
    async fn process(&self, raw: &str) -> Outcome {
        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(source) => {
                let e = PipelineError::InvalidUrl {
                    url: raw.to_string(),
                    source,
                };
                warn!(error = %e, "Skipping malformed URL");
                return Outcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };

        if self.config.skip_non_product && !is_product_url(raw) {
            info!("Not a product page; skipped");
            return Outcome::Skipped {
                reason: SKIPPED_REASON.to_string(),
            };
        }

        debug!(stage = "fetching", "Fetching page");
        let (service, page) = match self.fetch(&url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(stage = "fetch_failed", error = %e, "Fetch failed");
                return Outcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };
        info!(
            stage = "fetched",
            %service,
            content_length = page.content_length,
            "Fetched page"
        );

        debug!(stage = "extracting", "Extracting plan");
        let extractor = self.extractor;
        let request = ExtractRequest {
            content: &page.content,
            images: &page.images,
            hints: &page.hints,
            url: raw,
        };
        let request = &request;
        let extracted = with_backoff(&self.config.retry, "extract", move || {
            extractor.extract(request)
        })
        .await;

        match extracted {
            Ok(plan) => {
                let missing = plan.draft.missing_required();
                if !missing.is_empty() {
                    warn!(?missing, "Plan draft is missing required fields");
                }
                info!(stage = "extracted", plan = %plan.draft.label(), "Extracted plan");
                Outcome::Extracted {
                    service,
                    scraped: page,
                    plan,
                }
            }
            Err(e) => {
                warn!(stage = "extract_failed", error = %e, "Extraction failed");
                Outcome::ExtractFailed {
                    error: e.to_string(),
                    scraped: page,
                }
            }
        }
    }

    /// Try each configured service in order, each with the retry policy.
    async fn fetch(&self, url: &Url) -> Result<(ScraperService, ScrapedPage), PipelineError> {
        let fetcher = self.fetcher;
        let mut last_error = None;

        for (i, &service) in self.config.services.iter().enumerate() {
            let result = with_backoff(&self.config.retry, service.as_str(), move || {
                fetcher.fetch(url, service)
            })
            .await;
            match result {
                Ok(page) => return Ok((service, page)),
                Err(e) => {
                    if let Some(next) = self.config.services.get(i + 1) {
                        info!(%service, %next, error = %e, "Service failed; trying next");
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::Fetch {
            message: "no scraper service configured".to_string(),
        }))
    }

    fn pause_after(&self, outcome: &Outcome) -> Duration {
        match outcome {
            Outcome::FetchFailed { .. } => self.config.fetch_failure_delay(),
            Outcome::ExtractFailed { .. } | Outcome::Extracted { .. } => self.config.step_delay(),
            Outcome::Skipped { .. } => Duration::ZERO,
        }
    }
}

/// Check that an existing record belongs to `urls` and return it.
///
/// Every saved entry must match the URL at the same position; anything else
/// means the list changed since the run that produced the file.
pub fn resume_from(
    urls: &[String],
    prior: Vec<RunEntry>,
    path: &Path,
) -> Result<Vec<RunEntry>, PipelineError> {
    for (index, entry) in prior.iter().enumerate() {
        match urls.get(index) {
            Some(url) if *url == entry.url => {}
            other => {
                return Err(PipelineError::ResumeMismatch {
                    path: path.to_path_buf(),
                    index,
                    found: entry.url.clone(),
                    expected: other.cloned().unwrap_or_else(|| "end of list".to_string()),
                });
            }
        }
    }
    Ok(prior)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::models::{ExtractedPlan, Hints, PlanDraft, Scraped};
    use crate::outputs::JsonFileSink;
    use std::cell::{Cell, RefCell};

    type FetchFn = Box<dyn Fn(&Url, ScraperService, usize) -> Result<ScrapedPage, PipelineError>>;
    type ExtractFn = Box<dyn Fn(&str) -> Result<PlanDraft, PipelineError>>;

    struct MockFetcher {
        respond: FetchFn,
        calls: RefCell<Vec<(String, ScraperService)>>,
    }

    impl MockFetcher {
        fn new(
            respond: impl Fn(&Url, ScraperService, usize) -> Result<ScrapedPage, PipelineError>
            + 'static,
        ) -> Self {
            Self {
                respond: Box::new(respond),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn ok() -> Self {
            Self::new(|url, _, _| Ok(page_for(url.as_str())))
        }

        fn urls(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    impl PageFetcher for MockFetcher {
        async fn fetch(
            &self,
            url: &Url,
            service: ScraperService,
        ) -> Result<ScrapedPage, PipelineError> {
            let attempt = {
                let mut calls = self.calls.borrow_mut();
                calls.push((url.to_string(), service));
                calls.iter().filter(|(u, _)| u == url.as_str()).count()
            };
            (self.respond)(url, service, attempt)
        }
    }

    struct MockExtractor {
        respond: ExtractFn,
        calls: RefCell<Vec<String>>,
    }

    impl MockExtractor {
        fn new(respond: impl Fn(&str) -> Result<PlanDraft, PipelineError> + 'static) -> Self {
            Self {
                respond: Box::new(respond),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn ok() -> Self {
            Self::new(|url| {
                Ok(PlanDraft {
                    vendor_name: Some("Lucky Kitchen".into()),
                    title: Some(format!("Plan for {url}")),
                    ..PlanDraft::default()
                })
            })
        }
    }

    impl PlanExtractor for MockExtractor {
        async fn extract(
            &self,
            request: &ExtractRequest<'_>,
        ) -> Result<ExtractedPlan, PipelineError> {
            self.calls.borrow_mut().push(request.url.to_string());
            (self.respond)(request.url).map(ExtractedPlan::from)
        }
    }

    /// Keeps every snapshot; fails on persist call number `fail_on`.
    #[derive(Default)]
    struct RecordingSink {
        snapshots: Vec<Vec<RunEntry>>,
        fail_on: Option<usize>,
    }

    impl ResultSink for RecordingSink {
        async fn persist(&mut self, entries: &[RunEntry]) -> Result<(), PipelineError> {
            if self.fail_on == Some(self.snapshots.len() + 1) {
                return Err(PipelineError::Write {
                    path: PathBuf::from("results.json"),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.snapshots.push(entries.to_vec());
            Ok(())
        }
    }

    impl RecordingSink {
        fn last(&self) -> &[RunEntry] {
            self.snapshots.last().map(Vec::as_slice).unwrap_or(&[])
        }
    }

    /// Writes through to a real file, then fails once `remaining` runs out.
    struct InterruptingSink {
        inner: JsonFileSink,
        remaining: usize,
    }

    impl ResultSink for InterruptingSink {
        async fn persist(&mut self, entries: &[RunEntry]) -> Result<(), PipelineError> {
            if self.remaining == 0 {
                return Err(PipelineError::Write {
                    path: self.inner.path().to_path_buf(),
                    source: std::io::Error::other("interrupted"),
                });
            }
            self.remaining -= 1;
            self.inner.persist(entries).await
        }
    }

    fn page_for(url: &str) -> ScrapedPage {
        ScrapedPage {
            url: url.to_string(),
            title: format!("Title of {url}"),
            content: "# 年菜\n\n特價 2,888 元".to_string(),
            content_length: 17,
            images: (0..7).map(|i| format!("{url}/img{i}.jpg")).collect(),
            hints: Hints::default(),
            extra: Default::default(),
        }
    }

    fn quiet_config() -> PipelineConfig {
        PipelineConfig {
            fetch_failure_delay_ms: 0,
            step_delay_ms: 0,
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        }
    }

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_record_has_one_entry_per_url_and_checkpoints_each() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let list = urls(&["https://a.example/x", "https://b.example/y", "https://c.example/z"]);

        let mut totals = Vec::new();
        for _ in 0..2 {
            let mut sink = RecordingSink::default();
            let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
                .run(&list, Vec::new(), PathBuf::from("out.json"))
                .await
                .unwrap();
            let lengths: Vec<usize> = sink.snapshots.iter().map(Vec::len).collect();
            assert_eq!(lengths, vec![1, 2, 3]);
            assert_eq!(summary.success_count, 3);
            totals.push(summary.total_urls);

            let order: Vec<&str> = sink.last().iter().map(|e| e.url.as_str()).collect();
            assert_eq!(order, vec!["https://a.example/x", "https://b.example/y", "https://c.example/z"]);
        }
        assert_eq!(totals, vec![3, 3]);
    }

    #[tokio::test]
    async fn test_comments_and_blank_lines_never_reach_the_record() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink::default();
        let list = crate::sources::parse_url_list("https://a.example/x\n# comment\n\nhttps://b.example/y\n");

        let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        assert_eq!(summary.total_urls, 2);
        let order: Vec<&str> = sink.last().iter().map(|e| e.url.as_str()).collect();
        assert_eq!(order, vec!["https://a.example/x", "https://b.example/y"]);
    }

    #[tokio::test]
    async fn test_successful_entry_keeps_summary_and_plan() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink::default();

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&urls(&["https://a.example/x"]), Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        let entry = &sink.last()[0];
        assert!(entry.success);
        assert_eq!(entry.service, Some(ScraperService::Local));
        match &entry.scraped {
            Some(Scraped::Summary(s)) => {
                assert_eq!(s.title, "Title of https://a.example/x");
                assert_eq!(s.images.len(), 5);
            }
            other => panic!("expected summary, got {other:?}"),
        }
        assert_eq!(
            entry.plan.as_ref().and_then(|p| p.draft.vendor_name.as_deref()),
            Some("Lucky Kitchen")
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_retains_full_scrape() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::new(|_| {
            Err(PipelineError::ExtractionDeclined("no plan found".into()))
        });
        let config = quiet_config();
        let mut sink = RecordingSink::default();

        let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&urls(&["https://a.example/x"]), Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        let entry = &sink.last()[0];
        assert!(!entry.success);
        assert_eq!(entry.error.as_deref(), Some("no plan found"));
        assert!(entry.plan.is_none());
        match &entry.scraped {
            Some(Scraped::Full(page)) => {
                assert_eq!(page.content, "# 年菜\n\n特價 2,888 元");
                assert_eq!(page.images.len(), 7);
            }
            other => panic!("expected full scrape, got {other:?}"),
        }
        assert_eq!(summary.fail_count, 1);
    }

    #[tokio::test]
    async fn test_transport_error_never_reaches_extractor() {
        let fetcher = MockFetcher::new(|url, _, _| {
            if url.as_str() == "https://b.example/y" {
                Err(PipelineError::Fetch {
                    message: "error sending request: connection reset".into(),
                })
            } else {
                Ok(page_for(url.as_str()))
            }
        });
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink::default();

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(
                &urls(&["https://a.example/x", "https://b.example/y"]),
                Vec::new(),
                PathBuf::from("out.json"),
            )
            .await
            .unwrap();

        let entry = &sink.last()[1];
        assert_eq!(entry.url, "https://b.example/y");
        assert!(!entry.success);
        assert_eq!(
            entry.error.as_deref(),
            Some("error sending request: connection reset")
        );
        assert!(entry.scraped.is_none());
        assert!(entry.plan.is_none());
        assert_eq!(*extractor.calls.borrow(), vec!["https://a.example/x"]);
    }

    #[tokio::test]
    async fn test_all_fetches_failing() {
        let fetcher = MockFetcher::new(|_, _, _| Err(PipelineError::FetchHttp { status: 500 }));
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink::default();
        let list = urls(&["https://a.example/x", "https://b.example/y", "https://c.example/z"]);

        let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.fail_count, summary.total_urls);
        assert!(extractor.calls.borrow().is_empty());
        assert!(sink.last().iter().all(|e| e.error.as_deref() == Some("HTTP 500")));
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_outcome_per_url() {
        let fetcher = MockFetcher::new(|url, _, _| match url.host_str() {
            Some("fail.example") => Err(PipelineError::FetchHttp { status: 404 }),
            _ => Ok(page_for(url.as_str())),
        });
        let extractor = MockExtractor::new(|url| {
            if url.contains("decline") {
                Err(PipelineError::ExtractionDeclined("no plan found".into()))
            } else {
                Ok(PlanDraft::default())
            }
        });
        let config = quiet_config();
        let mut sink = RecordingSink::default();
        let list = urls(&[
            "https://fail.example/a",
            "https://ok.example/decline",
            "https://ok.example/plan",
        ]);

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        for entry in sink.last() {
            let fetch_failed = !entry.success && entry.scraped.is_none();
            let extract_failed = !entry.success && entry.scraped.is_some();
            let extracted = entry.success && entry.plan.is_some();
            let outcomes = [fetch_failed, extract_failed, extracted];
            assert_eq!(outcomes.iter().filter(|b| **b).count(), 1, "{entry:?}");
        }
        assert_eq!(
            *extractor.calls.borrow(),
            vec!["https://ok.example/decline", "https://ok.example/plan"]
        );
    }

    #[tokio::test]
    async fn test_malformed_url_is_recorded_without_network() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink::default();

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(
                &urls(&["shop.example/no-scheme", "https://a.example/x"]),
                Vec::new(),
                PathBuf::from("out.json"),
            )
            .await
            .unwrap();

        let entry = &sink.last()[0];
        assert!(!entry.success);
        assert!(entry
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("invalid URL shop.example/no-scheme")));
        assert_eq!(fetcher.urls(), vec!["https://a.example/x"]);
    }

    #[tokio::test]
    async fn test_sink_failure_aborts_run() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink {
            fail_on: Some(2),
            ..RecordingSink::default()
        };
        let list = urls(&["https://a.example/x", "https://b.example/y", "https://c.example/z"]);

        let err = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Write { .. }));
        assert_eq!(fetcher.urls().len(), 2);
        assert_eq!(sink.snapshots.len(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_run_leaves_k_entries_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let list = urls(&[
            "https://a.example/1",
            "https://a.example/2",
            "https://a.example/3",
            "https://a.example/4",
        ]);

        for k in 1..=3 {
            let mut sink = InterruptingSink {
                inner: JsonFileSink::new(&path),
                remaining: k,
            };
            let result = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
                .run(&list, Vec::new(), path.clone())
                .await;
            assert!(result.is_err());

            let raw = tokio::fs::read_to_string(&path).await.unwrap();
            let on_disk: Vec<serde_json::Value> = serde_json::from_str(&raw).unwrap();
            assert_eq!(on_disk.len(), k);
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_next_service() {
        let fetcher = MockFetcher::new(|url, service, _| match service {
            ScraperService::Jina => Err(PipelineError::FetchHttp { status: 429 }),
            _ => Ok(page_for(url.as_str())),
        });
        let extractor = MockExtractor::ok();
        let config = PipelineConfig {
            services: vec![ScraperService::Jina, ScraperService::Local],
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 0,
                max_delay_ms: 0,
            },
            ..quiet_config()
        };
        let mut sink = RecordingSink::default();

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&urls(&["https://a.example/x"]), Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        let services: Vec<ScraperService> =
            fetcher.calls.borrow().iter().map(|(_, s)| *s).collect();
        assert_eq!(
            services,
            vec![ScraperService::Jina, ScraperService::Jina, ScraperService::Local]
        );
        assert_eq!(sink.last()[0].service, Some(ScraperService::Local));
    }

    #[tokio::test]
    async fn test_fallback_reports_last_error() {
        let fetcher = MockFetcher::new(|_, service, _| match service {
            ScraperService::Firecrawl => Err(PipelineError::MissingApiKey { service }),
            _ => Err(PipelineError::FetchHttp { status: 503 }),
        });
        let extractor = MockExtractor::ok();
        let config = PipelineConfig {
            services: vec![ScraperService::Firecrawl, ScraperService::Local],
            ..quiet_config()
        };
        let mut sink = RecordingSink::default();

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&urls(&["https://a.example/x"]), Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        assert_eq!(sink.last()[0].error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_fetch_failure() {
        let fetcher = MockFetcher::new(|url, _, attempt| {
            if attempt == 1 {
                Err(PipelineError::Fetch {
                    message: "timed out".into(),
                })
            } else {
                Ok(page_for(url.as_str()))
            }
        });
        let extractor = MockExtractor::ok();
        let config = PipelineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 0,
                max_delay_ms: 0,
            },
            ..quiet_config()
        };
        let mut sink = RecordingSink::default();

        let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&urls(&["https://a.example/x"]), Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(fetcher.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_applies_to_declined_extraction() {
        let fetcher = MockFetcher::ok();
        let attempts = std::rc::Rc::new(Cell::new(0));
        let counter = attempts.clone();
        let extractor = MockExtractor::new(move |_| {
            counter.set(counter.get() + 1);
            Err(PipelineError::ExtractionDeclined("no plan found".into()))
        });
        let config = PipelineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 0,
                max_delay_ms: 0,
            },
            ..quiet_config()
        };
        let mut sink = RecordingSink::default();

        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&urls(&["https://a.example/x"]), Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        assert_eq!(attempts.get(), 3);
        assert_eq!(fetcher.urls().len(), 1);
        assert_eq!(sink.last()[0].error.as_deref(), Some("no plan found"));
    }

    #[tokio::test]
    async fn test_skip_non_product_pages() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = PipelineConfig {
            skip_non_product: true,
            ..quiet_config()
        };
        let mut sink = RecordingSink::default();
        let list = urls(&["https://shop.example/search?q=年菜", "https://shop.example/p/123"]);

        let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();

        let skipped = &sink.last()[0];
        assert!(skipped.skipped);
        assert_eq!(skipped.error.as_deref(), Some(SKIPPED_REASON));
        assert_eq!(fetcher.urls(), vec!["https://shop.example/p/123"]);
        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.fail_count, 0);
        assert_eq!(sink.last().len(), 2);
    }

    #[tokio::test]
    async fn test_resume_continues_after_saved_entries() {
        let fetcher = MockFetcher::ok();
        let extractor = MockExtractor::ok();
        let config = quiet_config();
        let mut sink = RecordingSink::default();
        let list = urls(&["https://a.example/1", "https://a.example/2", "https://a.example/3"]);
        let prior = vec![RunEntry::from_outcome(
            "https://a.example/1",
            Outcome::FetchFailed {
                error: "HTTP 500".into(),
            },
        )];

        let prior = resume_from(&list, prior, Path::new("out.json")).unwrap();
        let summary = Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, prior, PathBuf::from("out.json"))
            .await
            .unwrap();

        assert_eq!(fetcher.urls(), vec!["https://a.example/2", "https://a.example/3"]);
        let lengths: Vec<usize> = sink.snapshots.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![2, 3]);
        assert_eq!(summary.total_urls, 3);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(summary.success_count, 2);
    }

    #[test]
    fn test_resume_rejects_foreign_record() {
        let list = urls(&["https://a.example/1", "https://a.example/2"]);
        let entry = |url: &str| {
            RunEntry::from_outcome(url, Outcome::FetchFailed { error: "x".into() })
        };

        let err = resume_from(&list, vec![entry("https://other.example/1")], Path::new("o.json"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ResumeMismatch { index: 0, .. }));

        let too_long = vec![
            entry("https://a.example/1"),
            entry("https://a.example/2"),
            entry("https://a.example/3"),
        ];
        let err = resume_from(&list, too_long, Path::new("o.json")).unwrap_err();
        assert!(matches!(err, PipelineError::ResumeMismatch { index: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_urls_but_not_after_last() {
        let fetcher = MockFetcher::new(|url, _, _| {
            if url.path() == "/down" {
                Err(PipelineError::FetchHttp { status: 502 })
            } else {
                Ok(page_for(url.as_str()))
            }
        });
        let extractor = MockExtractor::ok();
        let config = PipelineConfig {
            fetch_failure_delay_ms: 1000,
            step_delay_ms: 2000,
            retry: RetryPolicy::none(),
            ..PipelineConfig::default()
        };
        let mut sink = RecordingSink::default();
        let list = urls(&[
            "https://a.example/down",
            "https://a.example/up",
            "https://a.example/last",
        ]);

        let t0 = tokio::time::Instant::now();
        Pipeline::new(&fetcher, &extractor, &mut sink, &config)
            .run(&list, Vec::new(), PathBuf::from("out.json"))
            .await
            .unwrap();
        let waited = t0.elapsed();

        // 1s after the failed fetch, 2s after the extracted page, none after the last
        assert!(waited >= Duration::from_millis(3000), "{waited:?}");
        assert!(waited < Duration::from_millis(4000), "{waited:?}");
    }
}
