//! Per-horse detail parser for nankankeiba.com (`uma_shosai` pages).
//!
//! One table row per runner: umaban, horse, jockey/trainer links,
//! jockey-trainer compatibility graph and the last three runs.

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

use super::{first_of, sel, text_joined, text_of};
use crate::normalize::normalize_name;
use crate::resources::Resources;

static NAME_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ 　]+").expect("valid regex"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)").expect("valid regex"));
static DIST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{3,4})m").expect("valid regex"));
static BARE_NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{3,4})").expect("valid regex"));
static POP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)人気").expect("valid regex"));
static WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\d\.]+").expect("valid regex"));
static AGARI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"3F.*?\((\d+)\)").expect("valid regex"));

/// Single-character venue abbreviations used in past-run cells, in lookup order
const VENUE_ABBREVIATIONS: [(&str, &str); 13] = [
    ("船", "船橋"),
    ("大", "大井"),
    ("川", "川崎"),
    ("浦", "浦和"),
    ("門", "門別"),
    ("盛", "盛岡"),
    ("水", "水沢"),
    ("笠", "笠松"),
    ("名", "名古屋"),
    ("園", "園田"),
    ("姫", "姫路"),
    ("高", "高知"),
    ("佐", "佐賀"),
];

/// Race-level information from the page header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceMeta {
    pub race_name: String,
    pub grade: String,
    pub course: String,
}

/// Everything collected for one runner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorseDetail {
    pub umaban: u8,
    pub name: String,
    pub jockey: String,
    pub trainer: String,
    /// `P:{value}` for today's jockey at today's course
    pub power: String,
    /// Jockey-trainer compatibility, `勝{rate}({wins}/{rides})` or `-`
    pub compat: String,
    /// Up to three formatted past runs, most recent first
    pub history: Vec<String>,
    /// Power line as shown in the prompt
    pub display_power: String,
}

/// Parsed detail page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceDetail {
    pub meta: RaceMeta,
    pub horses: BTreeMap<u8, HorseDetail>,
}

/// One formatted past run with the venue and jockey it was keyed on
struct PastRun {
    line: String,
    venue: String,
    jockey: String,
}

/// Parser for detail pages
pub struct DetailParser;

impl DetailParser {
    /// Parse a detail page for a race held at `place` (Japanese name)
    pub fn parse(html: &str, place: &str, resources: &Resources) -> Result<RaceDetail> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let mut detail = RaceDetail {
            meta: Self::parse_meta(root, place),
            ..Default::default()
        };

        let Some(table) = first_of(root, &["#shosai_aria table.nk23_c-table22__table"]) else {
            debug!("No detail table found");
            return Ok(detail);
        };

        for row in table.select(&sel("tbody tr")) {
            if let Some(horse) = Self::parse_row(row, place, resources) {
                detail.horses.insert(horse.umaban, horse);
            }
        }

        Ok(detail)
    }

    fn parse_meta(root: ElementRef<'_>, place: &str) -> RaceMeta {
        let race_name = first_of(root, &["h3.nk23_c-tab1__title"])
            .map(text_of)
            .unwrap_or_default();

        let grade = if race_name.is_empty() {
            String::new()
        } else {
            let parts: Vec<&str> = NAME_SPLIT_RE.split(&race_name).collect();
            if parts.len() > 1 {
                parts.last().map(|s| s.to_string()).unwrap_or_default()
            } else {
                String::new()
            }
        };

        let course = first_of(root, &["a.nk23_c-tab1__subtitle__text.is-blue"])
            .map(|el| format!("{} {}", place, text_of(el)))
            .unwrap_or_default();

        RaceMeta {
            race_name,
            grade,
            course,
        }
    }

    fn parse_row(row: ElementRef<'_>, place: &str, resources: &Resources) -> Option<HorseDetail> {
        let umaban_text = first_of(row, &["td.umaban", "td.is-col02"]).map(text_of)?;
        if umaban_text.is_empty() || !umaban_text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let umaban: u8 = umaban_text.parse().ok()?;

        let name = first_of(row, &["td.is-col03 a.is-link", "td.pr-umaName-textRound a.is-link"])
            .map(text_of)
            .unwrap_or_else(|| "不明".to_string());

        let (jockey_raw, trainer_raw) = match first_of(row, &["td.cs-g1"]) {
            Some(cell) => {
                let links: Vec<String> = cell.select(&sel("a")).map(text_of).collect();
                (
                    links.first().cloned().unwrap_or_default(),
                    links.get(1).cloned().unwrap_or_default(),
                )
            }
            None => (String::new(), String::new()),
        };
        let jockey = normalize_name(&jockey_raw, &resources.jockeys);
        let trainer = normalize_name(&trainer_raw, &resources.trainers);
        let power = resources.power_label(place, &jockey);

        let compat = Self::parse_compat(row);

        let mut history = Vec::new();
        let mut prev_power: Option<String> = None;
        for i in 1..=3 {
            let css = format!("td.cs-z{}", i);
            let Some(cell) = first_of(row, &[css.as_str()]) else {
                continue;
            };
            let Some(run) = Self::parse_past_run(cell, place, resources) else {
                continue;
            };
            if i == 1 {
                prev_power = resources
                    .power_value(&run.venue, &run.jockey)
                    .map(str::to_string);
            }
            history.push(run.line);
        }

        let display_power = match &prev_power {
            Some(prev) => format!("【騎手】{}(前P:{})、 相性:{}", power, prev, compat),
            None => format!("【騎手】{}、 相性:{}", power, compat),
        };

        Some(HorseDetail {
            umaban,
            name,
            jockey,
            trainer,
            power,
            compat,
            history,
            display_power,
        })
    }

    fn parse_compat(row: ElementRef<'_>) -> String {
        let Some(graph) = first_of(row, &["td.cs-ai2 .graph_text_div"]) else {
            return "-".to_string();
        };
        if text_of(graph).contains("データ") {
            return "-".to_string();
        }

        let part = |css: &str| first_of(graph, &[css]).map(text_of);
        match (part(".is-percent"), part(".is-number"), part(".is-total")) {
            (Some(rate), Some(wins), Some(total)) => format!("勝{}({}/{})", rate, wins, total),
            _ => "-".to_string(),
        }
    }

    fn parse_past_run(cell: ElementRef<'_>, place: &str, resources: &Resources) -> Option<PastRun> {
        let full_text = text_joined(cell, " ");
        if full_text.is_empty() {
            return None;
        }

        // Date and venue
        let mut date = String::new();
        let mut venue = String::new();
        if let Some(header) = first_of(cell, &["p.nk23_u-d-flex"]) {
            let header_text = text_joined(header, " ");
            if let Some(caps) = DATE_RE.captures(&header_text) {
                date = caps[1].to_string();
            }
            let rest = if date.is_empty() {
                header_text.clone()
            } else {
                header_text.replace(&date, "")
            };
            venue = Self::find_venue(&rest).unwrap_or_default();
        }
        if date.is_empty() {
            date = "不明".to_string();
        }
        if venue.is_empty() {
            venue = place.to_string();
        }

        // Prefer "1600m"; otherwise any 3-4 digit run outside the date
        let without_date = full_text.replace(&date, "");
        let distance = DIST_RE
            .captures(&full_text)
            .or_else(|| BARE_NUM_RE.captures(&without_date))
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();

        let rank = first_of(cell, &[".nk23_u-text19"])
            .map(|el| text_of(el).replace('着', ""))
            .unwrap_or_default();

        let lines: Vec<ElementRef<'_>> = cell.select(&sel("p.nk23_u-text10")).collect();

        // Popularity and the jockey who rode
        let mut popularity = String::new();
        let mut jockey_raw = String::new();
        if let Some(line) = lines.iter().find(|p| text_of(**p).contains("人気")) {
            if let Some(caps) = POP_RE.captures(&text_of(*line)) {
                popularity = format!("{}人", &caps[1]);
            }
            let spans: Vec<ElementRef<'_>> = line.select(&sel("span")).collect();
            if spans.len() >= 2 {
                jockey_raw = WEIGHT_RE.replace_all(&text_of(spans[1]), "").into_owned();
            }
        }

        // Last-3F rank; the last matching line wins
        let mut agari = String::new();
        for line in &lines {
            let text = text_joined(*line, " ");
            if text.contains("3F") {
                if let Some(caps) = AGARI_RE.captures(&text) {
                    agari = format!("3F:{}位", &caps[1]);
                }
            }
        }

        let passing = first_of(cell, &["p.position"])
            .map(|p| {
                p.select(&sel("span"))
                    .map(text_of)
                    .collect::<Vec<_>>()
                    .join("-")
            })
            .unwrap_or_default();

        let mut jockey = normalize_name(&jockey_raw, &resources.jockeys);
        if jockey.is_empty() && !jockey_raw.is_empty() {
            jockey = jockey_raw;
        }

        let rank_part = if rank.is_empty() {
            "着不明".to_string()
        } else {
            format!("{}着", rank)
        };
        let pop_part = if popularity.is_empty() {
            String::new()
        } else {
            format!("({})", popularity)
        };

        let line = format!(
            "{} {}{} {} {}({})→{}{}",
            date, venue, distance, jockey, passing, agari, rank_part, pop_part
        );

        Some(PastRun {
            line,
            venue,
            jockey,
        })
    }

    /// Full venue name first (including JRA), then single-char abbreviations
    fn find_venue(text: &str) -> Option<String> {
        VENUE_ABBREVIATIONS
            .iter()
            .map(|(_, full)| *full)
            .chain(std::iter::once("JRA"))
            .find(|full| text.contains(full))
            .or_else(|| {
                VENUE_ABBREVIATIONS
                    .iter()
                    .find(|(abbr, _)| text.contains(abbr))
                    .map(|(_, full)| *full)
            })
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<!DOCTYPE html>
<html><body>
<h3 class="nk23_c-tab1__title">東京記念　SⅠ</h3>
<a class="nk23_c-tab1__subtitle__text is-blue">ダート 2400m 右回り</a>
<div id="shosai_aria">
<table class="nk23_c-table22__table">
<thead><tr><th>馬番</th></tr></thead>
<tbody>
<tr>
  <td class="umaban">1</td>
  <td class="is-col03"><a class="is-link" href="/uma_info/1.do">ホースワン</a></td>
  <td class="cs-g1"><a>森泰</a><a>荒山</a></td>
  <td class="cs-ai2"><div class="graph_text_div"><span class="is-percent">25.0%</span><span class="is-number">5</span><span class="is-total">20</span></div></td>
  <td class="cs-z1">
    <p class="nk23_u-d-flex"><span>2023.12.29</span><span>大井</span></p>
    <p>東京大賞典 ダ2000m</p>
    <p class="nk23_u-text19">3着</p>
    <p class="nk23_u-text10"><span>5人気</span><span>森泰 57.0</span></p>
    <p class="nk23_u-text10">上り 3F 38.5 (2)</p>
    <p class="position"><span>4</span><span>4</span><span>3</span></p>
  </td>
  <td class="cs-z2">
    <p class="nk23_u-d-flex"><span>2023.11.3</span><span>JRA</span></p>
    <p>JBCクラシック 2000m</p>
    <p class="nk23_u-text19">8着</p>
    <p class="nk23_u-text10"><span>9人気</span><span>御神本 57</span></p>
  </td>
  <td class="cs-z3"></td>
</tr>
<tr>
  <td class="umaban">2</td>
  <td class="pr-umaName-textRound"><a class="is-link">ホースツー</a></td>
  <td class="cs-g1"><a>▲山田</a></td>
  <td class="cs-ai2"><div class="graph_text_div">データなし</div></td>
  <td class="cs-z1">
    <p class="nk23_u-d-flex"><span>2023.12.1</span><span>船</span></p>
    <p>1600m</p>
  </td>
</tr>
<tr>
  <td class="umaban">3</td>
  <td class="is-col03"><a class="is-link">ホーススリー</a></td>
  <td class="cs-g1"><a>御神本</a><a>荒山</a></td>
  <td class="cs-ai2"><div class="graph_text_div"><span class="is-percent">10.0%</span><span class="is-number">1</span></div></td>
  <td class="cs-z1">
    <p class="nk23_u-d-flex"><span>2023.10.5</span><span>川崎</span></p>
    <p>ダ 1400 重</p>
    <p class="nk23_u-text19">1着</p>
  </td>
</tr>
<tr>
  <td class="umaban">取消</td>
  <td class="is-col03"><a class="is-link">スクラッチ</a></td>
</tr>
</tbody>
</table>
</div>
</body></html>"#;

    fn resources() -> Resources {
        Resources::from_parts(
            vec!["森泰斗".to_string(), "御神本訓史".to_string()],
            vec!["荒山勝徳".to_string()],
            [
                (("大井".to_string(), "森泰斗".to_string()), "85.2".to_string()),
                (("船橋".to_string(), "森泰斗".to_string()), "83.0".to_string()),
            ],
        )
    }

    #[test]
    fn test_parse_meta() {
        let detail = DetailParser::parse(SAMPLE_HTML, "大井", &resources()).unwrap();
        assert_eq!(detail.meta.race_name, "東京記念　SⅠ");
        assert_eq!(detail.meta.grade, "SⅠ");
        assert_eq!(detail.meta.course, "大井 ダート 2400m 右回り");
    }

    #[test]
    fn test_parse_rows() {
        let detail = DetailParser::parse(SAMPLE_HTML, "大井", &resources()).unwrap();
        // Scratched row without a numeric umaban is skipped
        assert_eq!(detail.horses.len(), 3);

        let h1 = &detail.horses[&1];
        assert_eq!(h1.name, "ホースワン");
        assert_eq!(h1.jockey, "森泰斗");
        assert_eq!(h1.trainer, "荒山勝徳");
        assert_eq!(h1.power, "P:85.2");
        assert_eq!(h1.compat, "勝25.0%(5/20)");
    }

    #[test]
    fn test_parse_history_lines() {
        let detail = DetailParser::parse(SAMPLE_HTML, "大井", &resources()).unwrap();
        let h1 = &detail.horses[&1];

        assert_eq!(h1.history.len(), 2);
        assert_eq!(h1.history[0], "2023.12.29 大井2000 森泰斗 4-4-3(3F:2位)→3着(5人)");
        assert_eq!(h1.history[1], "2023.11.3 JRA2000 御神本訓史 ()→8着(9人)");
    }

    #[test]
    fn test_previous_power_in_display_line() {
        let detail = DetailParser::parse(SAMPLE_HTML, "大井", &resources()).unwrap();
        assert_eq!(
            detail.horses[&1].display_power,
            "【騎手】P:85.2(前P:85.2)、 相性:勝25.0%(5/20)"
        );
    }

    #[test]
    fn test_sparse_row() {
        let detail = DetailParser::parse(SAMPLE_HTML, "川崎", &resources()).unwrap();
        let h2 = &detail.horses[&2];

        assert_eq!(h2.name, "ホースツー");
        assert_eq!(h2.jockey, "山田");
        assert_eq!(h2.trainer, "");
        assert_eq!(h2.power, "P:不明");
        assert_eq!(h2.compat, "-");
        // Abbreviated venue, no rank, no jockey, no popularity
        assert_eq!(h2.history, vec!["2023.12.1 船橋1600  ()→着不明"]);
        assert_eq!(h2.display_power, "【騎手】P:不明、 相性:-");
    }

    #[test]
    fn test_distance_without_unit_skips_year() {
        let detail = DetailParser::parse(SAMPLE_HTML, "大井", &resources()).unwrap();
        assert_eq!(detail.horses[&3].history, vec!["2023.10.5 川崎1400  ()→1着"]);
    }

    #[test]
    fn test_partial_compat_is_dash() {
        let detail = DetailParser::parse(SAMPLE_HTML, "大井", &resources()).unwrap();
        let h3 = &detail.horses[&3];
        assert_eq!(h3.jockey, "御神本訓史");
        assert_eq!(h3.compat, "-");
        assert!(h3.display_power.ends_with("相性:-"));
    }

    #[test]
    fn test_missing_table_returns_meta_only() {
        let html = r#"<html><body><h3 class="nk23_c-tab1__title">一般</h3></body></html>"#;
        let detail = DetailParser::parse(html, "浦和", &resources()).unwrap();
        assert_eq!(detail.meta.race_name, "一般");
        assert_eq!(detail.meta.grade, "");
        assert_eq!(detail.meta.course, "");
        assert!(detail.horses.is_empty());
    }

    #[test]
    fn test_find_venue() {
        assert_eq!(DetailParser::find_venue("名古屋 11R").as_deref(), Some("名古屋"));
        assert_eq!(DetailParser::find_venue("JRA 東京").as_deref(), Some("JRA"));
        assert_eq!(DetailParser::find_venue("浦 1R").as_deref(), Some("浦和"));
        assert_eq!(DetailParser::find_venue("11R"), None);
    }
}
