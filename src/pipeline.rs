use std::collections::HashSet;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, EpisodeUpdate};
use crate::embed::{compose_text, DateField, Embedder};
use crate::episode::{normalize_date, normalize_date_or_warn, Episode};

pub struct IngestReport {
    pub scraped: usize,
    pub existing: usize,
    pub repeated: usize,
    /// Episodes not yet in the store, in page order.
    pub candidates: Vec<Episode>,
    pub inserted: usize,
}

/// Keep the episodes whose id is not stored yet. Ids repeated within the
/// page keep their first occurrence.
pub fn select_new(
    conn: &Connection,
    episodes: Vec<Episode>,
) -> Result<(Vec<Episode>, usize, usize)> {
    let mut seen = HashSet::new();
    let mut existing = 0;
    let mut repeated = 0;
    let mut fresh = Vec::new();

    for ep in episodes {
        if !seen.insert(ep.id.clone()) {
            warn!(episode_no = %ep.episode_no, title = %ep.title, "Repeated row in page, skipping");
            repeated += 1;
            continue;
        }
        if db::contains(conn, &ep.id)? {
            debug!(id = %ep.id, title = %ep.title, "Already stored");
            existing += 1;
            continue;
        }
        fresh.push(ep);
    }
    Ok((fresh, existing, repeated))
}

/// Dedup against the store, then insert every new episode in one batch.
pub fn ingest(conn: &Connection, episodes: Vec<Episode>, dry_run: bool) -> Result<IngestReport> {
    let scraped = episodes.len();
    let (candidates, existing, repeated) = select_new(conn, episodes)?;

    let inserted = if dry_run || candidates.is_empty() {
        0
    } else {
        db::insert_episodes(conn, &candidates)?
    };

    info!(
        scraped,
        existing,
        repeated,
        candidates = candidates.len(),
        inserted,
        dry_run,
        "Ingest finished"
    );
    Ok(IngestReport {
        scraped,
        existing,
        repeated,
        candidates,
        inserted,
    })
}

#[derive(Debug, Default, PartialEq)]
pub struct PassStats {
    pub updated: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Attach embeddings to stored episodes, one provider call at a time.
/// Failures are logged per episode and never stop the pass.
pub async fn enrich<E: Embedder>(
    conn: &Connection,
    embedder: &E,
    episodes: &[Episode],
    field: DateField,
    only_missing: bool,
) -> PassStats {
    let mut stats = PassStats::default();
    let pb = progress(episodes.len());

    for ep in episodes {
        pb.inc(1);
        if only_missing && ep.embedding.is_some() {
            stats.skipped += 1;
            continue;
        }

        let mut update = EpisodeUpdate::default();
        let text = match field {
            DateField::Date => {
                let mut dated = ep.clone();
                dated.formatted_date =
                    Some(normalize_date_or_warn(&ep.date, &ep.episode_no).formatted);
                update.formatted_date = dated.formatted_date.clone();
                compose_text(&dated, field)
            }
            DateField::Year => compose_text(ep, field),
        };

        match embedder.embed(&text).await {
            Ok(vector) => update.embedding = Some(vector),
            Err(e) => {
                pb.suspend(|| {
                    warn!(id = %ep.id, title = %ep.title, "Failed to generate embedding: {}", e)
                });
                stats.failed += 1;
                continue;
            }
        }

        match db::update_fields(conn, &ep.id, &update) {
            Ok(true) => {
                debug!(id = %ep.id, title = %ep.title, "Stored embedding");
                stats.updated += 1;
            }
            Ok(false) => {
                pb.suspend(|| warn!(id = %ep.id, title = %ep.title, "Episode vanished before update"));
                stats.failed += 1;
            }
            Err(e) => {
                pb.suspend(|| {
                    warn!(id = %ep.id, title = %ep.title, "Failed to update episode: {:#}", e)
                });
                stats.failed += 1;
            }
        }
    }

    pb.finish_and_clear();
    info!(
        updated = stats.updated,
        failed = stats.failed,
        skipped = stats.skipped,
        "Embedding pass finished"
    );
    stats
}

/// Recompute timestamp and ISO date for stored episodes from their raw date.
/// Empty or unparsable dates are skipped.
pub fn backfill_dates(conn: &Connection, episodes: &[Episode]) -> PassStats {
    let mut stats = PassStats::default();
    let pb = progress(episodes.len());

    for ep in episodes {
        pb.inc(1);
        let Some(parsed) = normalize_date(&ep.date) else {
            pb.suspend(|| warn!(id = %ep.id, date = %ep.date, "Date missing or unparsable, skipping"));
            stats.skipped += 1;
            continue;
        };

        let update = EpisodeUpdate {
            timestamp: Some(parsed.timestamp),
            formatted_date: Some(parsed.formatted),
            ..Default::default()
        };
        match db::update_fields(conn, &ep.id, &update) {
            Ok(true) => stats.updated += 1,
            Ok(false) => stats.failed += 1,
            Err(e) => {
                pb.suspend(|| warn!(id = %ep.id, "Failed to update timestamp: {:#}", e));
                stats.failed += 1;
            }
        }
    }

    pb.finish_and_clear();
    info!(
        updated = stats.updated,
        failed = stats.failed,
        skipped = stats.skipped,
        "Date backfill finished"
    );
    stats
}

fn progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}
