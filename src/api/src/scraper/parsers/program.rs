//! Meeting (kai/nichi) resolution from the portal's day program page.
//!
//! Race links carry a 16-digit id: `YYYYMMDD` + venue + kai + nichi + race.

use anyhow::{bail, Result};
use regex::Regex;
use scraper::Html;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::sel;
use crate::types::{Meeting, RaceDay};

static RACE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{8})(\d{2})(\d{2})(\d{2})(\d{2})\.do").expect("valid regex")
});

/// Parser for program pages
pub struct ProgramParser;

impl ProgramParser {
    /// Find kai/nichi for the given day from race links on the page
    pub fn parse_meeting(html: &str, day: &RaceDay) -> Result<Meeting> {
        let document = Html::parse_document(html);
        let date = day.compact_date();
        let venue = format!("{:02}", day.place.venue_code());

        for link in document.select(&sel("a[href]")) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            for caps in RACE_LINK_RE.captures_iter(href) {
                if caps[1] != *date || caps[2] != *venue {
                    continue;
                }
                let (Ok(kai), Ok(nichi)) = (caps[3].parse::<u8>(), caps[4].parse::<u8>()) else {
                    continue;
                };
                if kai > 0 && nichi > 0 {
                    return Ok(Meeting { kai, nichi });
                }
            }
        }

        bail!(
            "no race links for {} {} on the program page",
            day.slash_date(),
            day.place
        )
    }

    /// Race numbers linked for the given day
    pub fn parse_races(html: &str, day: &RaceDay) -> Vec<u8> {
        let document = Html::parse_document(html);
        let date = day.compact_date();
        let venue = format!("{:02}", day.place.venue_code());

        let mut races = BTreeSet::new();
        for link in document.select(&sel("a[href]")) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            for caps in RACE_LINK_RE.captures_iter(href) {
                if caps[1] == *date && caps[2] == *venue {
                    if let Ok(race) = caps[5].parse::<u8>() {
                        if (1..=12).contains(&race) {
                            races.insert(race);
                        }
                    }
                }
            }
        }
        races.into_iter().collect()
    }
}
