use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;

pub const DEFAULT_SOURCE_URL: &str =
    "https://the-time-crisis-universe.fandom.com/wiki/Episode_Guide";
pub const DEFAULT_SITE_BASE: &str = "https://the-time-crisis-universe.fandom.com";
pub const DEFAULT_DB_PATH: &str = "data/tc.sqlite";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Process settings, read from `TC_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub source_url: String,
    pub site_base: String,
    pub embedding_model: String,
    pub openai_base_url: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let mut settings: Settings = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("source_url", DEFAULT_SOURCE_URL)?
            .set_default("site_base", DEFAULT_SITE_BASE)?
            .set_default("embedding_model", DEFAULT_EMBEDDING_MODEL)?
            .set_default("openai_base_url", DEFAULT_OPENAI_BASE_URL)?
            .add_source(Environment::with_prefix("TC"))
            .build()
            .context("Failed to read TC_* settings")?
            .try_deserialize()
            .context("Invalid TC_* settings")?;

        settings.openai_api_key = resolve_api_key(
            settings.openai_api_key.take(),
            std::env::var("OPENAI_API_KEY").ok(),
        );
        Ok(settings)
    }

    /// The credential is only required by commands that call the provider.
    pub fn require_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .context("TC_OPENAI_API_KEY or OPENAI_API_KEY must be set for embedding")
    }
}

/// Prefer the prefixed key, fall back to the provider's conventional variable.
fn resolve_api_key(configured: Option<String>, fallback: Option<String>) -> Option<String> {
    let present = |k: &String| !k.trim().is_empty();
    configured.filter(present).or_else(|| fallback.filter(present))
}
