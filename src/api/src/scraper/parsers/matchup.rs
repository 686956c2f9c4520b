//! Head-to-head (taisen) page parser for nankankeiba.com.
//!
//! Header: date, race, then one column per current runner. Each body row
//! is a past race in which at least two of today's runners met.

use anyhow::Result;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::{first_of, sel, text_joined, text_of};

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s*(.*)$").expect("valid regex"));

/// Leading columns before the per-horse columns
const FIXED_COLUMNS: usize = 2;

/// One past meeting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchupRow {
    pub date: String,
    pub race: String,
    /// Finishing position per header horse, `None` when the horse did not run
    pub positions: Vec<Option<String>>,
}

/// Parsed head-to-head table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchupTable {
    /// (umaban, horse name) in column order
    pub horses: Vec<(u8, String)>,
    pub rows: Vec<MatchupRow>,
}

impl MatchupTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Parser for head-to-head pages
pub struct MatchupParser;

impl MatchupParser {
    pub fn parse(html: &str) -> Result<MatchupTable> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let Some(table) = first_of(
            root,
            &["#taisen table", "table.taisen", "table.nk23_c-table08__table"],
        ) else {
            return Ok(MatchupTable::default());
        };

        // Body column of each runner; unreadable header cells keep their slot
        let mut columns = Vec::new();
        let mut horses = Vec::new();
        if let Some(header) = first_of(table, &["thead tr", "tr"]) {
            let cell_sel = sel("th, td");
            let cells = header.select(&cell_sel).skip(FIXED_COLUMNS);
            for (col, cell) in cells.enumerate() {
                let text = text_joined(cell, " ");
                if let Some(caps) = HEADER_RE.captures(&text) {
                    if let Ok(umaban) = caps[1].parse::<u8>() {
                        columns.push(FIXED_COLUMNS + col);
                        horses.push((umaban, caps[2].trim().to_string()));
                    }
                }
            }
        }

        let mut rows = Vec::new();
        for tr in table.select(&sel("tbody tr")) {
            let cells: Vec<String> = tr.select(&sel("td")).map(text_of).collect();
            if cells.len() <= FIXED_COLUMNS {
                continue;
            }
            let positions: Vec<Option<String>> = columns
                .iter()
                .map(|&col| {
                    let c = cells.get(col)?.trim_end_matches('着').trim();
                    (!c.is_empty() && c != "-").then(|| c.to_string())
                })
                .collect();
            if positions.iter().flatten().count() == 0 {
                continue;
            }
            rows.push(MatchupRow {
                date: cells[0].clone(),
                race: cells[1].clone(),
                positions,
            });
        }

        Ok(MatchupTable { horses, rows })
    }
}
