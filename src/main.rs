mod db;
mod embed;
mod episode;
mod error;
mod fetch;
mod parser;
mod pipeline;
mod settings;

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use embed::openai::OpenAiEmbedder;
use embed::DateField;
use settings::Settings;

#[derive(Parser)]
#[command(name = "tc_scraper", about = "Time Crisis episode guide ingester")]
struct Cli {
    /// SQLite store (overrides TC_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GuestMatch {
    /// Correlate by episode URL, then episode number
    Key,
    /// Correlate by row position across all tables
    Position,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the episode guide and insert episodes not stored yet
    Ingest {
        /// Episode guide URL (overrides TC_SOURCE_URL)
        #[arg(long)]
        url: Option<String>,
        /// Take guest lists from a separately fetched page
        #[arg(long)]
        guest_source: Option<String>,
        /// How guest rows from --guest-source are matched to episodes
        #[arg(long, value_enum, default_value = "key")]
        guest_match: GuestMatch,
        /// Show what would be inserted without writing
        #[arg(long)]
        dry_run: bool,
        /// Embed the newly inserted episodes after the insert commits
        #[arg(long, conflicts_with = "dry_run")]
        embed: bool,
        /// Field used in the date slot of the embedding text
        #[arg(long, value_enum, default_value = "date")]
        field: DateField,
    },
    /// Generate embeddings for stored episodes
    Embed {
        /// Field used in the date slot of the embedding text
        #[arg(long, value_enum, default_value = "date")]
        field: DateField,
        /// Skip episodes that already have an embedding
        #[arg(long)]
        only_missing: bool,
        /// Max stored episodes to scan
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Recompute timestamps and ISO dates from the raw date text
    BackfillDates,
    /// Show store statistics
    Stats,
    /// Episodes overview table
    List {
        /// Only episodes with a guest matching this name
        #[arg(short, long)]
        guest: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Print one stored episode as JSON
    Show {
        /// Episode id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let db_path = cli.db.clone().unwrap_or_else(|| settings.db_path.clone());

    let conn = db::connect(&db_path)?;
    db::init_schema(&conn)?;
    info!("Store: {}", db_path.display());

    let result = match cli.command {
        Commands::Ingest {
            url,
            guest_source,
            guest_match,
            dry_run,
            embed,
            field,
        } => {
            let client = fetch::client()?;
            let embedder = if embed {
                Some(openai_embedder(&settings, &client)?)
            } else {
                None
            };

            let source_url = url.unwrap_or_else(|| settings.source_url.clone());
            let html = fetch::fetch_page(&client, &source_url).await?;

            let episodes = match guest_source {
                None => parser::parse_episodes(&html, &settings.site_base),
                Some(guest_url) => {
                    let mut episodes =
                        parser::parse_episodes_without_guests(&html, &settings.site_base);
                    let guest_html = fetch::fetch_page(&client, &guest_url).await?;
                    let rows = parser::parse_guest_rows(&guest_html, &settings.site_base);
                    match guest_match {
                        GuestMatch::Key => {
                            parser::guests::annotate_by_key(&mut episodes, rows);
                        }
                        GuestMatch::Position => {
                            let lists = rows.into_iter().map(|r| r.guests).collect();
                            parser::guests::annotate_by_position(&mut episodes, lists);
                        }
                    }
                    episodes
                }
            };

            if episodes.is_empty() {
                warn!("No episode rows found at {}", source_url);
            }

            let report = pipeline::ingest(&conn, episodes, dry_run)?;
            println!(
                "Scraped {} episodes: {} already stored, {} repeated, {} new.",
                report.scraped,
                report.existing,
                report.repeated,
                report.candidates.len()
            );

            if dry_run {
                for ep in &report.candidates {
                    println!(
                        "  {:>4} | {:<32} | {:<10} | {}",
                        ep.episode_no,
                        clip(&ep.title, 32),
                        ep.formatted_date.as_deref().unwrap_or(""),
                        ep.guests.join(", ")
                    );
                }
                println!("Dry run: nothing written.");
            } else if report.inserted > 0 {
                println!("Inserted {} new episodes.", report.inserted);
            } else {
                println!("No new unique episodes to insert.");
            }

            if let Some(embedder) = embedder.filter(|_| report.inserted > 0) {
                let stats =
                    pipeline::enrich(&conn, &embedder, &report.candidates, field, false).await;
                println!(
                    "Embedded {} new episodes ({} failed).",
                    stats.updated, stats.failed
                );
            }
            Ok(())
        }
        Commands::Embed {
            field,
            only_missing,
            limit,
        } => {
            let client = fetch::client()?;
            let embedder = openai_embedder(&settings, &client)?;
            let mut episodes = db::fetch_all(&conn)?;
            if let Some(n) = limit {
                episodes.truncate(n);
            }
            if episodes.is_empty() {
                println!("No episodes stored. Run 'ingest' first.");
                return Ok(());
            }
            println!("Embedding {} episodes...", episodes.len());
            let stats = pipeline::enrich(&conn, &embedder, &episodes, field, only_missing).await;
            println!(
                "Updated {} episodes ({} failed, {} skipped).",
                stats.updated, stats.failed, stats.skipped
            );
            Ok(())
        }
        Commands::BackfillDates => {
            let episodes = db::fetch_all(&conn)?;
            if episodes.is_empty() {
                println!("No episodes stored. Run 'ingest' first.");
                return Ok(());
            }
            let stats = pipeline::backfill_dates(&conn, &episodes);
            println!(
                "Updated {} timestamps ({} unparsable, {} failed).",
                stats.updated, stats.skipped, stats.failed
            );
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Total:       {}", s.total);
            println!("Dated:       {}", s.dated);
            println!("Undated:     {}", s.undated);
            println!("With guests: {}", s.with_guests);
            println!("Embedded:    {}", s.embedded);
            Ok(())
        }
        Commands::List { guest, limit } => {
            let rows = db::fetch_overview(&conn, guest.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No episodes found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:>5} | {:<32} | {:<18} | {:<40} | {:>3}",
                "#", "Ep", "Title", "Date", "Guests", "Vec"
            );
            println!("{}", "-".repeat(118));

            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:>5} | {:<32} | {:<18} | {:<40} | {:>3}",
                    i + 1,
                    clip(&r.episode_no, 5),
                    clip(&r.title, 32),
                    clip(&r.formatted_date, 18),
                    clip(&r.guests.join(", "), 40),
                    if r.has_embedding { "yes" } else { "-" }
                );
            }

            println!("\n{} episodes", rows.len());
            Ok(())
        }
        Commands::Show { id } => match db::fetch_one(&conn, &id)? {
            Some(ep) => {
                println!("{}", serde_json::to_string_pretty(&ep)?);
                Ok(())
            }
            None => Err(anyhow!("No episode with id {}", id)),
        },
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

fn openai_embedder(settings: &Settings, client: &reqwest::Client) -> Result<OpenAiEmbedder> {
    let key = settings.require_api_key()?;
    Ok(OpenAiEmbedder::new(
        client.clone(),
        key,
        settings.embedding_model.as_str(),
        &settings.openai_base_url,
    ))
}

/// Clip to `width` chars for the table columns, marking the cut with `…`.
fn clip(s: &str, width: usize) -> Cow<'_, str> {
    if s.chars().nth(width).is_none() {
        return Cow::Borrowed(s);
    }
    let end = s
        .char_indices()
        .nth(width.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    Cow::Owned(format!("{}\u{2026}", &s[..end]))
}

fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    match (secs / 3600, secs % 3600 / 60) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, m) => format!("{}m {:02}s", m, secs % 60),
        (h, m) => format!("{}h {:02}m", h, m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_short_text() {
        assert_eq!(clip("Pilot", 5), "Pilot");
        assert!(matches!(clip("Pilot", 32), Cow::Borrowed(_)));
    }

    #[test]
    fn clip_counts_chars_not_bytes() {
        assert_eq!(clip("Time-Crisis", 5), "Time\u{2026}");
        assert_eq!(clip("Beyoncé Knowles", 8), "Beyoncé\u{2026}");
        assert_eq!(clip("abc", 0), "\u{2026}");
    }

    #[test]
    fn elapsed_label_scales_units() {
        assert_eq!(elapsed_label(Duration::from_millis(1500)), "1.5s");
        assert_eq!(elapsed_label(Duration::from_secs(125)), "2m 05s");
        assert_eq!(elapsed_label(Duration::from_secs(3 * 3600 + 7 * 60 + 9)), "3h 07m");
    }
}
