//! nankankeiba.com adapter: meeting resolution, detail and head-to-head pages.

use anyhow::{Context, Result};
use tracing::info;

use super::cache::PageKind;
use super::http::HttpFetcher;
use super::parsers::{DetailParser, MatchupParser, MatchupTable, ProgramParser, RaceDetail};
use super::{detail_url, matchup_url, program_url};
use crate::resources::Resources;
use crate::types::{Meeting, RaceDay, RaceKey};

/// Client for the regional portal
#[derive(Clone)]
pub struct NankanClient {
    fetcher: HttpFetcher,
    base_url: String,
}

impl NankanClient {
    pub fn new(fetcher: HttpFetcher, base_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Program page; cached only once it links the day's races
    async fn program_page(&self, day: &RaceDay) -> Result<String> {
        let url = program_url(&self.base_url, day);
        let key = format!("{}{:02}", day.compact_date(), day.place.venue_code());
        let html = self
            .fetcher
            .get_checked(&url, &[], Some((PageKind::Program, &key)), |html| {
                ProgramParser::parse_meeting(html, day).is_ok()
            })
            .await
            .with_context(|| format!("failed to fetch program page {}", url))?;
        Ok(html)
    }

    /// Find kai/nichi for a race day
    pub async fn resolve_meeting(&self, day: &RaceDay) -> Result<Meeting> {
        let html = self.program_page(day).await?;
        let meeting = ProgramParser::parse_meeting(&html, day)?;
        info!(
            "{} {}: kai {} nichi {}",
            day.slash_date(),
            day.place,
            meeting.kai,
            meeting.nichi
        );
        Ok(meeting)
    }

    /// Race numbers held on the day
    pub async fn list_races(&self, day: &RaceDay) -> Result<Vec<u8>> {
        let html = self.program_page(day).await?;
        Ok(ProgramParser::parse_races(&html, day))
    }

    /// Fetch and parse the per-horse detail page
    pub async fn fetch_detail(&self, key: &RaceKey, resources: &Resources) -> Result<RaceDetail> {
        let url = detail_url(&self.base_url, key);
        let id = key.portal_id();
        let html = self
            .fetcher
            .get(&url, &[], Some((PageKind::Detail, &id)))
            .await
            .with_context(|| format!("failed to fetch detail page {}", url))?;
        DetailParser::parse(&html, key.day.place.name(), resources)
    }

    /// Fetch and parse the head-to-head page
    pub async fn fetch_matchup(&self, key: &RaceKey) -> Result<MatchupTable> {
        let url = matchup_url(&self.base_url, key);
        let id = key.portal_id();
        let html = self
            .fetcher
            .get(&url, &[], Some((PageKind::Matchup, &id)))
            .await
            .with_context(|| format!("failed to fetch matchup page {}", url))?;
        MatchupParser::parse(&html)
    }
}
