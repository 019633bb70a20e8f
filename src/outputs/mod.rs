//! Result sinks for the run record.
//!
//! # Submodules
//!
//! - [`json`]: rewrites the record as a pretty-printed JSON array
//!
//! # Output Structure
//!
//! ```text
//! data/scrape-results.json
//! [
//!   { "url": "...", "success": true, "service": "local",
//!     "scraped": { "title": "...", "images": [...] }, "plan": { ... } },
//!   { "url": "...", "success": false, "error": "no plan found",
//!     "scraped": { "url": "...", "content": "...", ... } },
//!   { "url": "...", "success": false, "error": "HTTP 500" }
//! ]
//! ```

pub mod json;

use crate::errors::PipelineError;
use crate::models::RunEntry;

pub use json::JsonFileSink;

/// Durable home of the run record.
///
/// `persist` receives the full record every time and replaces whatever was
/// stored before.
pub trait ResultSink {
    async fn persist(&mut self, entries: &[RunEntry]) -> Result<(), PipelineError>;
}
