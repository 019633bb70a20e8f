//! Data models for scraped pages, extracted plan drafts and the run record.
//!
//! This module defines the structures that flow through the pipeline:
//! - [`ScrapedPage`]: normalized page content returned by a fetcher
//! - [`Hints`]: structural cues derived from page text
//! - [`PlanDraft`]: the loosely typed meal plan produced by the AI service
//! - [`ExtractedPlan`]: the service's plan object as received, plus its
//!   [`PlanDraft`] view
//! - [`Outcome`] and [`RunEntry`]: the terminal result for one URL and its
//!   persisted form
//! - [`RunSummary`]: counts reported once at the end of a run
//!
//! Wire formats use camelCase field names to match the fetch and extraction
//! endpoints.

use std::path::PathBuf;
use std::time::Duration;

use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::scrapers::ScraperService;

/// How many images are kept in the `scraped` summary of a successful entry.
pub const SUMMARY_IMAGE_LIMIT: usize = 5;

/// Normalized content of one vendor page.
///
/// `content` is the only required field; everything else defaults when the
/// fetch service leaves it out. Extra fields the service returns (prompt,
/// service name, ...) are kept in `extra` so a failed extraction can be
/// retried later from the saved payload alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedPage {
    /// Final URL of the page after redirects.
    #[serde(default)]
    pub url: String,
    /// Page title.
    #[serde(default)]
    pub title: String,
    /// Page text, possibly truncated for the AI prompt.
    pub content: String,
    /// Length of the untruncated content in characters.
    #[serde(default)]
    pub content_length: usize,
    /// Absolute image URLs discovered on the page.
    #[serde(default)]
    pub images: Vec<String>,
    /// Structural cues used to steer extraction.
    #[serde(default)]
    pub hints: Hints,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScrapedPage {
    /// The compact form stored for successful entries.
    pub fn summary(&self) -> ScrapedSummary {
        ScrapedSummary {
            title: self.title.clone(),
            images: self
                .images
                .iter()
                .take(SUMMARY_IMAGE_LIMIT)
                .cloned()
                .collect(),
        }
    }
}

/// Lightweight cues pulled from page text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hints {
    pub prices: Vec<u32>,
    pub servings: Vec<String>,
    pub dates: Vec<String>,
    pub phones: Vec<String>,
}

/// Title and first few images of a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// The `scraped` field of a run entry.
///
/// Successful entries keep a summary; extraction failures keep the full page
/// so extraction can be re-attempted without fetching again. `Full` is tried
/// first when reading a record back because only it carries `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scraped {
    Full(ScrapedPage),
    Summary(ScrapedSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingType {
    Delivery,
    Pickup,
    Both,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    Frozen,
    Chilled,
    RoomTemp,
    #[serde(other)]
    Unknown,
}

/// A candidate meal plan as returned by the extraction service.
///
/// Every field is optional: `None` means the model did not find it. Values of
/// the wrong shape are treated as missing rather than failing the whole
/// record, and fields not modelled here are carried through in `extra`.
/// This is a read-only view for logging; the run record stores the object
/// the service sent (see [`ExtractedPlan`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraft {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub price_original: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub shipping_fee: Option<u32>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub shipping_type: Option<ShippingType>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<StorageType>,

    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub servings_min: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub servings_max: Option<u32>,

    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Vec::is_empty")]
    pub delivery_areas: Vec<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub order_deadline: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fulfill_start: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fulfill_end: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub can_select_date: Option<bool>,

    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Vec::is_empty")]
    pub dishes: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Vec::is_empty")]
    pub allergens: Vec<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlanDraft {
    /// Names of the fields a published plan cannot do without.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.vendor_name.is_none() {
            missing.push("vendorName");
        }
        if self.title.is_none() {
            missing.push("title");
        }
        if self.price_discount.is_none() {
            missing.push("priceDiscount");
        }
        if self.servings_min.is_none() {
            missing.push("servingsMin");
        }
        missing
    }

    /// `vendor - title` for log lines.
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.vendor_name.as_deref().unwrap_or("unknown vendor"),
            self.title.as_deref().unwrap_or("unknown title")
        )
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Reads `2888`, `2888.4`, `"2888"` or `"NT$2,888 元"` as 2888.
fn number_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == ',')
                .filter(char::is_ascii_digit)
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// A plan object exactly as the extraction service returned it.
///
/// Serializes back to `raw` untouched, so values like `"面議"` or `"6-8人"`
/// reach downstream normalization as sent. `draft` is derived from `raw`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPlan {
    pub draft: PlanDraft,
    pub raw: Map<String, Value>,
}

impl ExtractedPlan {
    pub fn from_map(raw: Map<String, Value>) -> Self {
        let draft = serde_json::from_value(Value::Object(raw.clone())).unwrap_or_default();
        Self { draft, raw }
    }
}

impl From<PlanDraft> for ExtractedPlan {
    fn from(draft: PlanDraft) -> Self {
        let raw = match serde_json::to_value(&draft) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self { draft, raw }
    }
}

impl Serialize for ExtractedPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExtractedPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Self::from_map)
    }
}

/// Terminal outcome for one URL. Exactly one is produced per URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The page could not be fetched; extraction was never attempted.
    FetchFailed { error: String },
    /// The page was fetched but no plan came out of it.
    ExtractFailed { error: String, scraped: ScrapedPage },
    /// A plan draft was extracted.
    Extracted {
        service: ScraperService,
        scraped: ScrapedPage,
        plan: ExtractedPlan,
    },
    /// The URL was filtered out before any network activity.
    Skipped { reason: String },
}

/// One element of the persisted run record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    pub url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ScraperService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped: Option<Scraped>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExtractedPlan>,
}

impl RunEntry {
    pub fn from_outcome(url: impl Into<String>, outcome: Outcome) -> Self {
        let url = url.into();
        match outcome {
            Outcome::FetchFailed { error } => RunEntry {
                url,
                success: false,
                skipped: false,
                service: None,
                error: Some(error),
                scraped: None,
                plan: None,
            },
            Outcome::ExtractFailed { error, scraped } => RunEntry {
                url,
                success: false,
                skipped: false,
                service: None,
                error: Some(error),
                scraped: Some(Scraped::Full(scraped)),
                plan: None,
            },
            Outcome::Extracted {
                service,
                scraped,
                plan,
            } => RunEntry {
                url,
                success: true,
                skipped: false,
                service: Some(service),
                error: None,
                scraped: Some(Scraped::Summary(scraped.summary())),
                plan: Some(plan),
            },
            Outcome::Skipped { reason } => RunEntry {
                url,
                success: false,
                skipped: true,
                service: None,
                error: Some(reason),
                scraped: None,
                plan: None,
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}

/// Counts reported once a run finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub success_count: usize,
    pub fail_count: usize,
    pub skipped_count: usize,
    pub total_urls: usize,
    pub output_path: PathBuf,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn from_entries(
        entries: &[RunEntry],
        total_urls: usize,
        output_path: PathBuf,
        elapsed: Duration,
    ) -> Self {
        RunSummary {
            success_count: entries.iter().filter(|e| e.success).count(),
            fail_count: entries.iter().filter(|e| e.is_failure()).count(),
            skipped_count: entries.iter().filter(|e| e.skipped).count(),
            total_urls,
            output_path,
            elapsed,
        }
    }
}
