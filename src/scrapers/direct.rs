//! In-process page fetcher.
//!
//! Downloads the vendor page itself and reduces the HTML to a markdown-ish
//! text block, no fetch endpoint needed. Works for the many vendor shops that
//! render their product pages server-side; pages that need JavaScript should
//! go through the endpoint's `local` browser backend instead.

use itertools::Itertools;
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{PageFetcher, ScraperService};
use crate::errors::PipelineError;
use crate::hints::{extract_hints, truncate_content};
use crate::models::ScrapedPage;

/// Most images kept per page.
pub const IMAGE_LIMIT: usize = 20;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));
static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static BLOCKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4, p, li").expect("valid selector"));
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").expect("valid selector"));

#[derive(Debug, Clone)]
pub struct DirectFetcher {
    client: Client,
    content_limit: usize,
}

impl DirectFetcher {
    pub fn new(client: Client, content_limit: usize) -> Self {
        Self {
            client,
            content_limit,
        }
    }
}

impl PageFetcher for DirectFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(
        &self,
        url: &Url,
        _service: ScraperService,
    ) -> Result<ScrapedPage, PipelineError> {
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Vendor page returned an error status");
            return Err(PipelineError::FetchHttp {
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| PipelineError::Fetch {
            message: e.to_string(),
        })?;

        let page = parse_page(&html, &final_url, self.content_limit);
        if page.content_length == 0 {
            return Err(PipelineError::Fetch {
                message: "page has no readable content".to_string(),
            });
        }
        info!(
            bytes = html.len(),
            content_length = page.content_length,
            images = page.images.len(),
            "Parsed vendor page"
        );
        Ok(page)
    }
}

/// Reduce an HTML document to title, text, images and hints.
///
/// `contentLength` and the hints describe the full text; `content` is cut to
/// `content_limit` characters.
pub fn parse_page(html: &str, base: &Url, content_limit: usize) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .or_else(|| document.select(&H1).next().map(element_text))
        .unwrap_or_default();

    let blocks: Vec<String> = document
        .select(&BLOCKS)
        .filter_map(|el| {
            let text = element_text(el);
            if text.is_empty() {
                return None;
            }
            Some(match el.value().name() {
                "h1" | "h2" | "h3" | "h4" => format!("## {text}"),
                "li" => format!("- {text}"),
                _ => text,
            })
        })
        .collect();

    let mut content = String::new();
    if !title.is_empty() {
        content.push_str(&format!("# {title}\n\n"));
    }
    content.push_str(&blocks.join("\n\n"));

    let images: Vec<String> = document
        .select(&IMAGES)
        .filter_map(|el| el.value().attr("src"))
        .filter_map(|src| base.join(src.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
        .unique()
        .take(IMAGE_LIMIT)
        .collect();

    let hints = extract_hints(&content);
    let content_length = if blocks.is_empty() {
        0
    } else {
        content.chars().count()
    };
    debug!(%base, blocks = blocks.len(), "Extracted page blocks");

    ScrapedPage {
        url: base.to_string(),
        title,
        content: truncate_content(&content, content_limit),
        content_length,
        images,
        hints,
        extra: Default::default(),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).filter(|t| !t.is_empty()).join(" ")
}
