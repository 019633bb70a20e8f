//! URL list loading and product-page filtering.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument};

use crate::errors::PipelineError;

static NON_PRODUCT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)/search",
        r"(?i)keyword=",
        r"(?i)\?q=",
        r"(?i)/category/?$",
        r"(?i)/collections/?$",
        r"^\w+://[^/]+/?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid url pattern"))
    .collect()
});

/// Split a URL list into entries, keeping file order.
///
/// Lines are trimmed; blank lines and lines whose first non-whitespace
/// character is `#` are dropped.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and parse the URL list at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_urls(path: &Path) -> Result<Vec<String>, PipelineError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let urls = parse_url_list(&text);
    info!(count = urls.len(), "Loaded URL list");
    Ok(urls)
}

/// False for search results, bare category listings and site roots, which
/// never describe a single meal plan.
pub fn is_product_url(url: &str) -> bool {
    !NON_PRODUCT_PATTERNS.iter().any(|re| re.is_match(url))
}
