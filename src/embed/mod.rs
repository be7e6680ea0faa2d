pub mod openai;

use clap::ValueEnum;

use crate::episode::Episode;
use crate::error::EmbedError;

pub type Embedding = Vec<f32>;

/// Text-to-vector provider. One text in, one fixed-length vector out.
#[allow(async_fn_in_trait)]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError>;
}

/// Which field fills the date slot of the composed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DateField {
    /// Normalized air date; the pass also stores the normalized date.
    #[default]
    Date,
    /// Top-5 comparison year.
    Year,
}

/// Canonical embedding input: title, guests, date or year, notes.
pub fn compose_text(ep: &Episode, field: DateField) -> String {
    let (label, value) = match field {
        DateField::Date => ("Date", ep.formatted_date.as_deref().unwrap_or(&ep.date)),
        DateField::Year => ("Year", ep.top5_comparison_year.as_str()),
    };
    format!(
        "Title: {}. Guests: {}. {}: {}. Notes: {}",
        ep.title,
        ep.guests.join(", "),
        label,
        value,
        ep.notes
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pilot() -> Episode {
        Episode {
            title: "Pilot".into(),
            guests: vec!["Alice".into(), "Bob".into()],
            date: "November 15, 2015".into(),
            formatted_date: Some("2015-11-15".into()),
            top5_comparison_year: "1983".into(),
            notes: "intro episode".into(),
            ..Default::default()
        }
    }

    #[test]
    fn date_text_is_fixed_order() {
        assert_eq!(
            compose_text(&pilot(), DateField::Date),
            "Title: Pilot. Guests: Alice, Bob. Date: 2015-11-15. Notes: intro episode"
        );
    }

    #[test]
    fn year_text_uses_comparison_year() {
        assert_eq!(
            compose_text(&pilot(), DateField::Year),
            "Title: Pilot. Guests: Alice, Bob. Year: 1983. Notes: intro episode"
        );
    }

    #[test]
    fn missing_formatted_date_falls_back_to_raw() {
        let mut ep = pilot();
        ep.formatted_date = None;
        ep.guests.clear();
        assert_eq!(
            compose_text(&ep, DateField::Date),
            "Title: Pilot. Guests: . Date: November 15, 2015. Notes: intro episode"
        );
    }
}
