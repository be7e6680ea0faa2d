pub mod guests;
pub mod table;

use scraper::Html;

use crate::episode::Episode;
use guests::GuestRow;

/// Single-parse pipeline: every row is scraped and its guest cell read from the
/// same parsed row, so guest lists cannot drift onto neighbouring episodes.
pub fn parse_episodes(html: &str, site_base: &str) -> Vec<Episode> {
    let doc = Html::parse_document(html);
    table::episode_rows(&doc)
        .iter()
        .map(|row| {
            let mut episode = table::scrape_row(row, site_base);
            episode.guests = guests::row_guests(row);
            episode
        })
        .collect()
}

/// Scalar fields only, for runs that take guests from a separate page.
pub fn parse_episodes_without_guests(html: &str, site_base: &str) -> Vec<Episode> {
    let doc = Html::parse_document(html);
    table::episode_rows(&doc)
        .iter()
        .map(|row| table::scrape_row(row, site_base))
        .collect()
}

/// Guest rows of an independently fetched page.
pub fn parse_guest_rows(html: &str, site_base: &str) -> Vec<GuestRow> {
    let doc = Html::parse_document(html);
    table::episode_rows(&doc)
        .iter()
        .map(|row| guests::guest_row(row, site_base))
        .collect()
}
