use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::episode::Episode;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn =
        Connection::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS episodes (
            id                   TEXT PRIMARY KEY,
            url                  TEXT NOT NULL,
            title                TEXT NOT NULL,
            episode_no           TEXT NOT NULL,
            date                 TEXT NOT NULL,
            formatted_date       TEXT,
            timestamp            TEXT,
            guests               TEXT NOT NULL DEFAULT '[]',
            top5_comparison_year TEXT NOT NULL,
            notes                TEXT NOT NULL,
            embedding            TEXT,
            created_at           TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_episodes_timestamp ON episodes(timestamp);
        ",
    )?;
    Ok(())
}

// ── Writes ──

pub fn contains(conn: &Connection, id: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM episodes WHERE id = ?1", [id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Insert one episode unless its id is already stored. Never touches an
/// existing row.
pub fn create_if_absent(conn: &Connection, ep: &Episode) -> Result<bool> {
    let embedding = ep.embedding.as_ref().map(serde_json::to_string).transpose()?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO episodes
         (id, url, title, episode_no, date, formatted_date, timestamp, guests,
          top5_comparison_year, notes, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            ep.id,
            ep.url,
            ep.title,
            ep.episode_no,
            ep.date,
            ep.formatted_date,
            ep.timestamp,
            serde_json::to_string(&ep.guests)?,
            ep.top5_comparison_year,
            ep.notes,
            embedding,
        ],
    )?;
    Ok(inserted == 1)
}

/// Insert a batch in one transaction. Any failure rolls the whole batch back.
pub fn insert_episodes(conn: &Connection, episodes: &[Episode]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    for ep in episodes {
        if create_if_absent(&tx, ep)
            .with_context(|| format!("Failed to insert episode {} ({})", ep.episode_no, ep.id))?
        {
            count += 1;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Partial field set for in-place updates of a stored episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeUpdate {
    pub embedding: Option<Vec<f32>>,
    pub formatted_date: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EpisodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.embedding.is_none() && self.formatted_date.is_none() && self.timestamp.is_none()
    }
}

/// Set only the fields present in `update`. Returns false when no row has `id`.
pub fn update_fields(conn: &Connection, id: &str, update: &EpisodeUpdate) -> Result<bool> {
    if update.is_empty() {
        return contains(conn, id);
    }

    let mut fields: Vec<(&str, Box<dyn ToSql>)> = Vec::new();
    if let Some(embedding) = &update.embedding {
        fields.push(("embedding", Box::new(serde_json::to_string(embedding)?)));
    }
    if let Some(formatted) = &update.formatted_date {
        fields.push(("formatted_date", Box::new(formatted.clone())));
    }
    if let Some(ts) = update.timestamp {
        fields.push(("timestamp", Box::new(ts)));
    }

    let set_clause: Vec<String> = fields
        .iter()
        .enumerate()
        .map(|(i, (k, _))| format!("{} = ?{}", k, i + 1))
        .collect();
    let sql = format!(
        "UPDATE episodes SET {} WHERE id = ?{}",
        set_clause.join(", "),
        fields.len() + 1
    );

    let mut params: Vec<&dyn ToSql> = fields.iter().map(|(_, v)| v.as_ref()).collect();
    params.push(&id);
    let changed = conn.execute(&sql, params.as_slice())?;
    Ok(changed > 0)
}

// ── Reads ──

const EPISODE_COLUMNS: &str = "id, url, title, episode_no, date, formatted_date, timestamp,
     guests, top5_comparison_year, notes, embedding";

struct StoredRow {
    episode: Episode,
    guests: String,
    embedding: Option<String>,
}

impl StoredRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredRow {
            episode: Episode {
                id: row.get(0)?,
                url: row.get(1)?,
                title: row.get(2)?,
                episode_no: row.get(3)?,
                date: row.get(4)?,
                formatted_date: row.get(5)?,
                timestamp: row.get(6)?,
                guests: Vec::new(),
                top5_comparison_year: row.get(8)?,
                notes: row.get(9)?,
                embedding: None,
            },
            guests: row.get(7)?,
            embedding: row.get(10)?,
        })
    }

    fn into_episode(self) -> Result<Episode> {
        let mut ep = self.episode;
        ep.guests = serde_json::from_str(&self.guests)
            .with_context(|| format!("Corrupt guests column for {}", ep.id))?;
        ep.embedding = self
            .embedding
            .map(|e| serde_json::from_str(&e))
            .transpose()
            .with_context(|| format!("Corrupt embedding column for {}", ep.id))?;
        Ok(ep)
    }
}

/// Full scan in insertion order.
pub fn fetch_all(conn: &Connection) -> Result<Vec<Episode>> {
    let sql = format!("SELECT {} FROM episodes ORDER BY rowid", EPISODE_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], StoredRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(StoredRow::into_episode).collect()
}

pub fn fetch_one(conn: &Connection, id: &str) -> Result<Option<Episode>> {
    let sql = format!("SELECT {} FROM episodes WHERE id = ?1", EPISODE_COLUMNS);
    conn.query_row(&sql, [id], StoredRow::from_row)
        .optional()?
        .map(StoredRow::into_episode)
        .transpose()
}

// ── Overview ──

pub struct OverviewRow {
    pub episode_no: String,
    pub title: String,
    pub formatted_date: String,
    pub guests: Vec<String>,
    pub has_embedding: bool,
}

/// Stored episodes by air date, undated ones last; optionally only those
/// with a guest whose name contains `guest` (ASCII case-insensitive).
pub fn fetch_overview(
    conn: &Connection,
    guest: Option<&str>,
    limit: usize,
) -> Result<Vec<OverviewRow>> {
    let mut stmt = conn.prepare(
        "SELECT episode_no, title, COALESCE(formatted_date, date), guests, embedding IS NOT NULL
         FROM episodes
         WHERE ?1 IS NULL
            OR EXISTS (SELECT 1 FROM json_each(guests) WHERE value LIKE ?1 ESCAPE '\\')
         ORDER BY timestamp IS NULL, timestamp, rowid
         LIMIT ?2",
    )?;
    let pattern = guest.map(like_pattern);
    let rows = stmt
        .query_map(params![pattern, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(episode_no, title, formatted_date, guests, has_embedding)| {
            Ok(OverviewRow {
                episode_no,
                title,
                formatted_date,
                guests: serde_json::from_str(&guests)?,
                has_embedding,
            })
        })
        .collect()
}

/// `%needle%` with LIKE wildcards in `needle` matched literally.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub dated: usize,
    pub undated: usize,
    pub with_guests: usize,
    pub embedded: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM episodes", [], |r| r.get(0))?;
    let dated: usize = conn.query_row(
        "SELECT COUNT(*) FROM episodes WHERE timestamp IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let with_guests: usize = conn.query_row(
        "SELECT COUNT(*) FROM episodes WHERE guests != '[]'",
        [],
        |r| r.get(0),
    )?;
    let embedded: usize = conn.query_row(
        "SELECT COUNT(*) FROM episodes WHERE embedding IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        dated,
        undated: total - dated,
        with_guests,
        embedded,
    })
}

#[cfg(test)]
pub(crate) fn memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_schema(&conn).unwrap();
    conn
}
