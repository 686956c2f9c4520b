//! HTML parsers for the portal, authority and subscription pages.

pub mod detail;
pub mod matchup;
pub mod program;
pub mod race_card;
pub mod training;

pub use detail::{DetailParser, HorseDetail, RaceDetail};
pub use matchup::{MatchupParser, MatchupTable};
pub use program::ProgramParser;
pub use race_card::{CardEntry, RaceCard, RaceCardParser};
pub use training::{TrainingNote, TrainingParser};

use scraper::{ElementRef, Selector};

/// Parse a selector written in this crate
pub(crate) fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {:?}: {:?}", css, e))
}

/// First descendant matching the first selector that matches anything
pub(crate) fn first_of<'a>(el: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .find_map(|css| el.select(&sel(css)).next())
}

/// Concatenated text with every fragment trimmed
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text().map(str::trim).collect::<String>()
}

/// Trimmed non-empty text fragments joined by `sep`
pub(crate) fn text_joined(el: ElementRef<'_>, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}
