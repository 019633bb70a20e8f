//! Structural hints and prompt-sized truncation for scraped page text.
//!
//! Vendor pages are noisy; a handful of regex passes picks out the values an
//! extraction model most often gets wrong (prices, party size, dates, phone
//! numbers) so they can be sent alongside the content.

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Hints;

/// Default character budget for content sent to the extraction service.
pub const DEFAULT_CONTENT_LIMIT: usize = 8000;

/// Appended to content that was cut.
pub const TRUNCATION_MARKER: &str = "\n\n[內容已截斷...]";

const PRICE_MIN: u32 = 500;
const PRICE_MAX: u32 = 50_000;

static PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)NT\$?\s?(\d{1,3}(?:,\d{3})+|\d+)",
        r"\$\s?(\d{1,3}(?:,\d{3})+|\d+)",
        r"(\d{1,3}(?:,\d{3})+|\d+)\s*元",
        r"售價[：:]\s*(\d{1,3}(?:,\d{3})+|\d+)",
        r"原價[：:]\s*(\d{1,3}(?:,\d{3})+|\d+)",
        r"特價[：:]\s*(\d{1,3}(?:,\d{3})+|\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid price pattern"))
    .collect()
});

static SERVING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(\d+)\s*[-~至]\s*(\d+)\s*人",
        r"(\d+)\s*人份",
        r"適合\s*(\d+)\s*人",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid serving pattern"))
    .collect()
});

// Full dates first so `2026/01/28` is not also reported as `26/01`.
static DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}[/\-.]\d{1,2}[/\-.]\d{1,2}|\d{1,2}[/\-.]\d{1,2}").expect("valid date pattern")
});

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0\d{1,2}[-\s]?\d{3,4}[-\s]?\d{3,4}").expect("valid phone pattern"));

/// Pull price, serving, date and phone hints out of page text.
///
/// Prices outside 500..=50000 are ignored as shipping fees or quantities.
/// Each list is de-duplicated and capped: 5 prices (ascending), 3 servings,
/// 5 dates, 3 phones.
pub fn extract_hints(text: &str) -> Hints {
    let prices = PRICE_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().replace(',', "").parse::<u32>().ok())
        .filter(|p| (PRICE_MIN..=PRICE_MAX).contains(p))
        .unique()
        .sorted()
        .take(5)
        .collect();

    let servings = SERVING_PATTERNS
        .iter()
        .flat_map(|re| re.find_iter(text))
        .map(|m| m.as_str().to_string())
        .unique()
        .take(3)
        .collect();

    let dates = DATE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .unique()
        .take(5)
        .collect();

    let phones = PHONE_PATTERN
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .unique()
        .take(3)
        .collect();

    Hints {
        prices,
        servings,
        dates,
        phones,
    }
}

/// Cut `content` to at most `max_chars` characters plus [`TRUNCATION_MARKER`].
///
/// When a sentence end (`。`, `！`, `？`, a blank line or `. `) falls in the
/// last 30% of the budget, the cut moves back to it.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    let Some((cut, _)) = content.char_indices().nth(max_chars) else {
        return content.to_string();
    };
    let truncated = &content[..cut];

    let sentence_end = ["。", "！", "？", "\n\n", ". "]
        .iter()
        .filter_map(|mark| truncated.rfind(mark).map(|idx| (idx, *mark)))
        .max_by_key(|(idx, _)| *idx);

    if let Some((idx, mark)) = sentence_end {
        let char_pos = truncated[..idx].chars().count();
        if char_pos.saturating_mul(10) > max_chars.saturating_mul(7) {
            // keep the first character of the terminator
            let keep = idx + mark.chars().next().map_or(0, char::len_utf8);
            return format!("{}{}", &truncated[..keep], TRUNCATION_MARKER);
        }
    }

    format!("{truncated}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "# 金豬報喜年菜\n\n\
        原價：3,280 特價：2,888 元，運費 $150\n\
        適合 6 人享用，4~6人 皆宜，另有 10人份\n\
        預購截止 2026/01/20，到貨 1/25-1/28\n\
        訂購專線 02-2345-6789 或 0912345678";

    #[test]
    fn test_extract_prices_in_range_sorted() {
        let hints = extract_hints(PAGE);
        assert_eq!(hints.prices, vec![2888, 3280]);
    }

    #[test]
    fn test_extract_servings() {
        let hints = extract_hints(PAGE);
        assert_eq!(hints.servings, vec!["4~6人", "10人份", "適合 6 人"]);
    }

    #[test]
    fn test_extract_dates_prefers_full_dates() {
        let hints = extract_hints(PAGE);
        assert_eq!(hints.dates[0], "2026/01/20");
        assert!(hints.dates.contains(&"1/25".to_string()));
        assert!(!hints.dates.contains(&"26/01".to_string()));
    }

    #[test]
    fn test_extract_phones() {
        let hints = extract_hints(PAGE);
        assert_eq!(hints.phones, vec!["02-2345-6789", "0912345678"]);
    }

    #[test]
    fn test_extract_hints_empty_text() {
        assert_eq!(extract_hints(""), Hints::default());
    }

    #[test]
    fn test_price_without_separator_is_read_whole() {
        let hints = extract_hints("NT$2888");
        assert_eq!(hints.prices, vec![2888]);
    }

    #[test]
    fn test_price_cap_at_five() {
        let text = "NT$1000 NT$1100 NT$1200 NT$1300 NT$1400 NT$1500 NT$900";
        let hints = extract_hints(text);
        assert_eq!(hints.prices, vec![900, 1000, 1100, 1200, 1300]);
    }

    #[test]
    fn test_truncate_short_content_unchanged() {
        assert_eq!(truncate_content("短內容", 10), "短內容");
    }

    #[test]
    fn test_truncate_with_huge_limit() {
        let s = format!("{}。{}", "字".repeat(40), "b".repeat(20));
        assert_eq!(truncate_content(&s, usize::MAX), s);
        assert_eq!(truncate_content(&s, usize::MAX / 7 + 1), s);
    }

    #[test]
    fn test_truncate_hard_cut() {
        let s = "a".repeat(100);
        let out = truncate_content(&s, 50);
        assert_eq!(out, format!("{}{}", "a".repeat(50), TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_backs_up_to_sentence_end() {
        let s = format!("{}。{}", "字".repeat(40), "尾".repeat(40));
        let out = truncate_content(&s, 50);
        assert_eq!(out, format!("{}。{}", "字".repeat(40), TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_ignores_early_sentence_end() {
        let s = format!("{}。{}", "字".repeat(10), "尾".repeat(80));
        let out = truncate_content(&s, 50);
        assert_eq!(out.chars().count(), 50 + TRUNCATION_MARKER.chars().count());
    }
}
