//! Training (cyokyo) page parser for the subscription racing-form site.

use anyhow::Result;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{first_of, sel, text_joined, text_of};

/// Training evaluation for one runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingNote {
    pub umaban: u8,
    pub horse_name: String,
    /// Short verdict printed next to the horse ("気配上々" etc.)
    pub comment: String,
    /// Trend arrow / mark, when the page shows one
    pub rating: String,
}

impl TrainingNote {
    /// Single line for the prompt
    pub fn summary(&self) -> String {
        match (self.rating.is_empty(), self.comment.is_empty()) {
            (true, _) => self.comment.clone(),
            (false, true) => self.rating.clone(),
            (false, false) => format!("{} {}", self.rating, self.comment),
        }
    }
}

/// Parser for training pages
pub struct TrainingParser;

impl TrainingParser {
    pub fn parse(html: &str) -> Result<BTreeMap<u8, TrainingNote>> {
        let document = Html::parse_document(html);
        let mut notes = BTreeMap::new();

        for row in document.select(&sel("table.cyokyo tr")) {
            if let Some(note) = Self::parse_row(row) {
                notes.entry(note.umaban).or_insert(note);
            }
        }

        Ok(notes)
    }

    fn parse_row(row: ElementRef<'_>) -> Option<TrainingNote> {
        let umaban: u8 = first_of(row, &["td.umaban"])
            .map(text_of)
            .and_then(|t| t.parse().ok())?;

        let horse_name = first_of(row, &["td.kbamei a", "td.kbamei"])
            .map(text_of)
            .unwrap_or_default();
        let comment = first_of(row, &["td.tanpyo"])
            .map(|el| text_joined(el, " "))
            .unwrap_or_default();

        // The mark is sometimes an image
        let rating = first_of(row, &["td.yajirusi"])
            .map(|cell| {
                let text = text_of(cell);
                if !text.is_empty() {
                    return text;
                }
                first_of(cell, &["img[alt]"])
                    .and_then(|img| img.value().attr("alt"))
                    .unwrap_or_default()
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();

        Some(TrainingNote {
            umaban,
            horse_name,
            comment,
            rating,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><body>
<table class="cyokyo">
  <tr>
    <td class="umaban">1</td>
    <td class="kbamei"><a href="/db/uma/1">ホースワン</a></td>
    <td class="tanpyo">動き 軽快</td>
    <td class="yajirusi"><img src="up.png" alt="↗"></td>
  </tr>
  <tr><td class="cyokyodata">美坂 52.1-38.0-12.5</td></tr>
</table>
<table class="cyokyo">
  <tr>
    <td class="umaban">2</td>
    <td class="kbamei">ホースツー</td>
    <td class="tanpyo"></td>
    <td class="yajirusi">→</td>
  </tr>
</table>
<table class="cyokyo">
  <tr><td class="umaban">除外</td><td class="tanpyo">-</td></tr>
</table>
</body></html>"#;

    #[test]
    fn test_parse_notes() {
        let notes = TrainingParser::parse(SAMPLE_HTML).unwrap();
        assert_eq!(notes.len(), 2);

        let first = &notes[&1];
        assert_eq!(first.horse_name, "ホースワン");
        assert_eq!(first.comment, "動き 軽快");
        assert_eq!(first.rating, "↗");
        assert_eq!(first.summary(), "↗ 動き 軽快");

        let second = &notes[&2];
        assert_eq!(second.comment, "");
        assert_eq!(second.summary(), "→");
    }

    #[test]
    fn test_summary_without_rating() {
        let note = TrainingNote {
            umaban: 3,
            comment: "平凡".to_string(),
            ..Default::default()
        };
        assert_eq!(note.summary(), "平凡");
    }
}
