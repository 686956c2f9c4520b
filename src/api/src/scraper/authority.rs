//! keiba.go.jp adapter: official race card (DebaTable).

use anyhow::{Context, Result};

use super::cache::PageKind;
use super::http::HttpFetcher;
use super::parsers::{RaceCard, RaceCardParser};
use super::race_card_url;
use crate::types::RaceDay;

/// Client for the racing authority site
#[derive(Clone)]
pub struct AuthorityClient {
    fetcher: HttpFetcher,
    base_url: String,
}

impl AuthorityClient {
    pub fn new(fetcher: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Query parameters identifying one race
    fn race_query(day: &RaceDay, race: u8) -> Vec<(&'static str, String)> {
        vec![
            ("k_raceDate", day.slash_date()),
            ("k_raceNo", race.to_string()),
            ("k_babaCode", day.place.baba_code().to_string()),
        ]
    }

    /// Fetch and parse the race card
    pub async fn fetch_race_card(&self, day: &RaceDay, race: u8) -> Result<RaceCard> {
        let url = race_card_url(&self.base_url);
        let cache_key = format!(
            "{}{:02}{:02}",
            day.compact_date(),
            day.place.baba_code(),
            race
        );
        let html = self
            .fetcher
            .get(
                &url,
                &Self::race_query(day, race),
                Some((PageKind::RaceCard, &cache_key)),
            )
            .await
            .with_context(|| format!("failed to fetch race card {} {}R", day.place, race))?;
        RaceCardParser::parse(&html)
    }
}
