//! Error taxonomy for a pipeline run.
//!
//! Errors fall into two groups. Per-URL errors (invalid URL, fetch and
//! extraction failures) are turned into data by the orchestrator and written
//! into the run record. Run errors (URL list, config, resume, sink) stop the
//! run and surface through `main`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::scrapers::ScraperService;

/// Everything that can go wrong while scraping and extracting plans.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An input file (URL list or earlier run record) could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line from the URL list is not an absolute URL.
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// A remote backend needs credentials that were not configured.
    #[error("{service} requires an API key")]
    MissingApiKey { service: ScraperService },

    /// The fetch service answered with a non-2xx status.
    #[error("HTTP {status}")]
    FetchHttp { status: u16 },

    /// Transport or decode failure talking to the fetch service.
    #[error("{message}")]
    Fetch { message: String },

    /// The extraction service answered with a non-2xx status.
    #[error("AI HTTP {status}")]
    ExtractHttp { status: u16 },

    /// Transport or decode failure talking to the extraction service.
    #[error("{message}")]
    Extract { message: String },

    /// The extraction service was reachable but produced no plan.
    #[error("{0}")]
    ExtractionDeclined(String),

    /// The run record could not be persisted.
    #[error("failed to write results to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode results: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The existing output file does not belong to this URL list.
    #[error("cannot resume from {path}: entry {index} is {found}, expected {expected}")]
    ResumeMismatch {
        path: PathBuf,
        index: usize,
        found: String,
        expected: String,
    },
}

impl PipelineError {
    /// Whether another attempt against the same service may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::FetchHttp { .. }
            | PipelineError::Fetch { .. }
            | PipelineError::ExtractHttp { .. }
            | PipelineError::Extract { .. }
            | PipelineError::ExtractionDeclined(_) => true,
            _ => false,
        }
    }
}
