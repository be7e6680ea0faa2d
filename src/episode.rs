use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Footnote markers the wiki appends to cells, e.g. `November 15, 2015[1]`.
static FOOTNOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());

const SOURCE_DATE_FORMAT: &str = "%B %d, %Y";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Episode {
    pub id: String,
    pub url: String,
    pub title: String,
    pub episode_no: String,
    pub date: String,
    pub formatted_date: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub guests: Vec<String>,
    pub top5_comparison_year: String,
    pub notes: String,
    pub embedding: Option<Vec<f32>>,
}

impl Episode {
    /// Build a record from scraped cells: derives the id and normalizes the date.
    pub fn from_row(
        url: String,
        title: String,
        episode_no: String,
        date: String,
        top5_comparison_year: String,
        notes: String,
    ) -> Self {
        let id = episode_id(&url, &title, &episode_no);
        let normalized = normalize_date_or_warn(&date, &episode_no);
        Episode {
            id,
            url,
            title,
            episode_no,
            formatted_date: Some(normalized.formatted),
            timestamp: normalized.timestamp,
            date,
            guests: Vec::new(),
            top5_comparison_year,
            notes,
            embedding: None,
        }
    }
}

/// Stable identifier from the natural key: hex(sha256("{url}-{title}-{episode_no}")).
pub fn episode_id(url: &str, title: &str, episode_no: &str) -> String {
    let digest = Sha256::digest(format!("{}-{}-{}", url, title, episode_no).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDate {
    pub timestamp: DateTime<Utc>,
    pub formatted: String,
}

/// Parse "Month D, Year" into midnight UTC and its ISO-8601 date.
pub fn normalize_date(raw: &str) -> Option<ParsedDate> {
    let cleaned = FOOTNOTE_RE.replace_all(raw, "");
    let date = NaiveDate::parse_from_str(cleaned.trim(), SOURCE_DATE_FORMAT).ok()?;
    let timestamp = date.and_hms_opt(0, 0, 0)?.and_utc();
    Some(ParsedDate {
        timestamp,
        formatted: date.format(ISO_DATE_FORMAT).to_string(),
    })
}

/// Outcome of the keep-with-fallback policy: the record is never dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDate {
    pub timestamp: Option<DateTime<Utc>>,
    pub formatted: String,
}

/// Unparsable dates keep the raw text as the formatted value and no timestamp.
pub fn normalize_date_or_warn(raw: &str, episode_no: &str) -> NormalizedDate {
    match normalize_date(raw) {
        Some(parsed) => NormalizedDate {
            timestamp: Some(parsed.timestamp),
            formatted: parsed.formatted,
        },
        None => {
            warn!(episode_no, date = raw, "Failed to parse date, keeping raw text");
            NormalizedDate {
                timestamp: None,
                formatted: raw.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_is_deterministic() {
        let a = episode_id("https://x/wiki/Pilot", "Pilot", "1");
        let b = episode_id("https://x/wiki/Pilot", "Pilot", "1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn id_depends_on_every_key_field() {
        let base = episode_id("u", "t", "1");
        assert_ne!(base, episode_id("u2", "t", "1"));
        assert_ne!(base, episode_id("u", "t2", "1"));
        assert_ne!(base, episode_id("u", "t", "2"));
    }

    #[test]
    fn id_matches_known_digest() {
        assert_eq!(
            episode_id("https://the-time-crisis-universe.fandom.com/wiki/Pilot", "Pilot", "1"),
            "46f5a0f59427ffa02e86e97901ab28e5e99bb4c7c630b31717077f5905a86ab2"
        );
        // empty key fields still hash the separators
        assert_eq!(
            episode_id("", "", ""),
            "d8156bae0c4243d3742fc4e9774d8aceabe0410249d720c855f98afc88ff846c"
        );
    }

    #[test]
    fn parses_source_format() {
        let parsed = normalize_date("November 15, 2015").unwrap();
        assert_eq!(parsed.formatted, "2015-11-15");
        assert_eq!(parsed.timestamp, Utc.with_ymd_and_hms(2015, 11, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_single_digit_day_and_footnote() {
        let parsed = normalize_date("  March 3, 2018[2] ").unwrap();
        assert_eq!(parsed.formatted, "2018-03-03");
    }

    #[test]
    fn unparsable_date_keeps_raw_text() {
        assert!(normalize_date("not a date").is_none());
        let n = normalize_date_or_warn("not a date", "12");
        assert_eq!(n.timestamp, None);
        assert_eq!(n.formatted, "not a date");
    }

    #[test]
    fn from_row_never_drops_bad_dates() {
        let ep = Episode::from_row(
            "https://x/wiki/E".into(),
            "E".into(),
            "7".into(),
            "TBA".into(),
            "".into(),
            "".into(),
        );
        assert_eq!(ep.timestamp, None);
        assert_eq!(ep.formatted_date.as_deref(), Some("TBA"));
        assert_eq!(ep.id, episode_id("https://x/wiki/E", "E", "7"));
    }
}
