use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::episode::Episode;

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.article-table").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

pub const COL_EPISODE_NO: usize = 0;
pub const COL_TITLE: usize = 1;
pub const COL_DATE: usize = 2;
pub const COL_GUESTS: usize = 3;
pub const COL_TOP5_YEAR: usize = 4;
pub const COL_NOTES: usize = 5;

/// One data row of an episode table, cells in column order.
#[derive(Debug, Clone)]
pub struct EpisodeRow<'a> {
    cells: Vec<ElementRef<'a>>,
}

impl<'a> EpisodeRow<'a> {
    pub fn cell(&self, col: usize) -> Option<ElementRef<'a>> {
        self.cells.get(col).copied()
    }

    /// Whitespace-collapsed text of a cell; empty when the column is missing.
    pub fn cell_text(&self, col: usize) -> String {
        self.cell(col).map(element_text).unwrap_or_default()
    }

    pub fn cell_href(&self, col: usize) -> Option<String> {
        self.cell(col)?
            .select(&LINK_SEL)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
    }

    pub fn url(&self, site_base: &str) -> String {
        self.cell_href(COL_TITLE)
            .map(|href| resolve_href(site_base, &href))
            .unwrap_or_default()
    }
}

/// Walk every episode table in document order, skipping each table's header row.
pub fn episode_rows(doc: &Html) -> Vec<EpisodeRow<'_>> {
    let mut rows = Vec::new();
    for table in doc.select(&TABLE_SEL) {
        for tr in table.select(&ROW_SEL).skip(1) {
            let cells = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
                .collect();
            rows.push(EpisodeRow { cells });
        }
    }
    rows
}

/// Extract the scalar fields of one row. Guests are filled in separately.
pub fn scrape_row(row: &EpisodeRow<'_>, site_base: &str) -> Episode {
    Episode::from_row(
        row.url(site_base),
        row.cell_text(COL_TITLE),
        row.cell_text(COL_EPISODE_NO),
        row.cell_text(COL_DATE),
        row.cell_text(COL_TOP5_YEAR),
        row.cell_text(COL_NOTES),
    )
}

/// Text nodes concatenated as rendered, then whitespace runs collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_href(site_base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!(
            "{}/{}",
            site_base.trim_end_matches('/'),
            href.trim_start_matches('/')
        )
    }
}
