use std::collections::HashMap;

use scraper::{ElementRef, Node};
use tracing::{debug, warn};

use super::table::{element_text, EpisodeRow, COL_EPISODE_NO, COL_GUESTS};
use crate::episode::Episode;

/// Cell content the guide uses for "no guests".
pub const NO_GUESTS: &str = "\u{2014}";

/// Guest list of one row of an independently parsed page, with the keys
/// needed to correlate it back to a scraped episode.
#[derive(Debug, Clone, PartialEq)]
pub struct GuestRow {
    pub url: String,
    pub episode_no: String,
    pub guests: Vec<String>,
}

pub fn row_guests(row: &EpisodeRow<'_>) -> Vec<String> {
    row.cell(COL_GUESTS).map(parse_guest_cell).unwrap_or_default()
}

pub fn guest_row(row: &EpisodeRow<'_>, site_base: &str) -> GuestRow {
    GuestRow {
        url: row.url(site_base),
        episode_no: row.cell_text(COL_EPISODE_NO),
        guests: row_guests(row),
    }
}

/// Guest names in node order: `a` and `span` children are one name each,
/// loose text is split on commas, anything else is ignored.
pub fn parse_guest_cell(cell: ElementRef<'_>) -> Vec<String> {
    if cell.inner_html().trim() == NO_GUESTS {
        return Vec::new();
    }

    let mut guests = Vec::new();
    for child in cell.children() {
        match child.value() {
            Node::Element(el) if matches!(el.name(), "a" | "span") => {
                if let Some(el) = ElementRef::wrap(child) {
                    push_name(&mut guests, &element_text(el));
                }
            }
            Node::Text(text) => {
                for piece in text.split(',') {
                    push_name(&mut guests, piece);
                }
            }
            _ => {}
        }
    }
    guests
}

fn push_name(guests: &mut Vec<String>, raw: &str) {
    let name = raw.trim_matches(|c: char| c.is_whitespace() || c == ',');
    if !name.is_empty() && name != NO_GUESTS {
        guests.push(name.to_string());
    }
}

/// Merge guest lists by ordinal position: the i-th guest list belongs to the
/// i-th episode. Only sound when both sequences came from identical markup.
pub fn annotate_by_position(episodes: &mut [Episode], guest_lists: Vec<Vec<String>>) {
    if guest_lists.len() != episodes.len() {
        warn!(
            episodes = episodes.len(),
            guest_rows = guest_lists.len(),
            "Guest row count differs from episode count; positional merge may misattribute"
        );
    }
    for (episode, guests) in episodes.iter_mut().zip(guest_lists) {
        episode.guests = guests;
    }
}

/// Merge guest rows by episode URL, falling back to episode number.
/// Returns how many episodes found no matching guest row.
pub fn annotate_by_key(episodes: &mut [Episode], rows: Vec<GuestRow>) -> usize {
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut by_no: HashMap<String, usize> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if !row.url.is_empty() {
            by_url.entry(row.url.clone()).or_insert(i);
        }
        if !row.episode_no.is_empty() {
            by_no.entry(row.episode_no.clone()).or_insert(i);
        }
    }

    let mut unmatched = 0;
    for episode in episodes.iter_mut() {
        let hit = by_url
            .get(&episode.url)
            .filter(|_| !episode.url.is_empty())
            .or_else(|| by_no.get(&episode.episode_no).filter(|_| !episode.episode_no.is_empty()));
        match hit {
            Some(&i) => episode.guests = rows[i].guests.clone(),
            None => {
                debug!(episode_no = %episode.episode_no, title = %episode.title, "No guest row for episode");
                episode.guests.clear();
                unmatched += 1;
            }
        }
    }

    if unmatched > 0 {
        warn!(unmatched, "Episodes without a matching guest row");
    }
    unmatched
}
