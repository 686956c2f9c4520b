//! Race card (DebaTable) parser for keiba.go.jp.
//!
//! A runner spans several table rows: the row holding the horse link also
//! carries the bracket and horse numbers, the jockey and trainer links
//! follow in the next rows.

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{first_of, sel, text_of};

static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}(?:\.\d)?)\s*(?:kg)?$").expect("valid regex"));

/// One runner on the card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardEntry {
    pub umaban: u8,
    pub horse_name: String,
    pub jockey: String,
    pub trainer: String,
    pub weight_carried: Option<f64>,
}

/// Parsed race card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceCard {
    pub title: String,
    pub entries: Vec<CardEntry>,
}

impl RaceCard {
    pub fn entry(&self, umaban: u8) -> Option<&CardEntry> {
        self.entries.iter().find(|e| e.umaban == umaban)
    }
}

/// Parser for DebaTable pages
pub struct RaceCardParser;

impl RaceCardParser {
    pub fn parse(html: &str) -> Result<RaceCard> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let title = first_of(root, &[".raceTitle h4", ".raceTitle", "h4"])
            .map(text_of)
            .unwrap_or_default();

        let mut entries: Vec<CardEntry> = Vec::new();
        let mut current: Option<CardEntry> = None;

        for row in root.select(&sel("tr")) {
            if let Some(horse) = first_of(row, &["a[href*='HorseMarkInfo']"]) {
                if let Some(done) = current.take() {
                    entries.push(done);
                }
                let Some(umaban) = Self::row_umaban(row) else {
                    continue;
                };
                current = Some(CardEntry {
                    umaban,
                    horse_name: text_of(horse),
                    ..Default::default()
                });
            }

            let Some(entry) = current.as_mut() else {
                continue;
            };
            if entry.jockey.is_empty() {
                if let Some(jockey) = first_of(row, &["a[href*='RiderMark']"]) {
                    entry.jockey = text_of(jockey);
                }
            }
            if entry.trainer.is_empty() {
                if let Some(trainer) = first_of(row, &["a[href*='TrainerMark']"]) {
                    entry.trainer = text_of(trainer);
                }
            }
            if entry.weight_carried.is_none() {
                entry.weight_carried = Self::row_weight(row);
            }
        }
        if let Some(done) = current.take() {
            entries.push(done);
        }

        entries.sort_by_key(|e| e.umaban);
        entries.dedup_by_key(|e| e.umaban);

        Ok(RaceCard { title, entries })
    }

    /// Horse number: the second numeric cell (after the bracket), or the only one
    fn row_umaban(row: ElementRef<'_>) -> Option<u8> {
        let numbers: Vec<u8> = row
            .select(&sel("td"))
            .map(text_of)
            .filter(|t| !t.is_empty() && t.len() <= 2 && t.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|t| t.parse().ok())
            .collect();

        match numbers.as_slice() {
            [] => None,
            [only] => Some(*only),
            [_, umaban, ..] => Some(*umaban),
        }
    }

    fn row_weight(row: ElementRef<'_>) -> Option<f64> {
        row.select(&sel("td"))
            .map(text_of)
            .filter(|t| t.contains('.') || t.ends_with("kg"))
            .find_map(|t| {
                WEIGHT_RE
                    .captures(&t)
                    .and_then(|caps| caps[1].parse::<f64>().ok())
                    .filter(|w| (48.0..=65.0).contains(w))
            })
    }
}
