//! Head-to-head table annotated with the grades found in a prediction reply.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::scraper::parsers::MatchupTable;

/// `3番 ホース名 評価:A`
static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\s*番[^\n]*?評価\s*[:：]?\s*([SABCDE])").expect("valid regex")
});

/// `◎ 3 ホース名`
static MARK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([◎○〇▲△☆✕×])\s*(\d{1,2})(?:\D|$)").expect("valid regex")
});

/// `[S] 5 ホース名`
static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[\[【(（]\s*([SABCDE])\s*[\]】)）]\s*(\d{1,2})(?:\D|$)").expect("valid regex")
});

/// Shown when the reply never graded a runner
const NO_GRADE: &str = "-";

/// Collect `umaban -> grade` from a reply. The first grade seen for a
/// runner wins.
pub fn parse_grades(reply: &str) -> BTreeMap<u8, String> {
    let mut grades = BTreeMap::new();

    for line in reply.lines() {
        let found = if let Some(caps) = NUMBERED_RE.captures(line) {
            Some((caps[1].to_string(), caps[2].to_string()))
        } else if let Some(caps) = BRACKET_RE.captures(line) {
            Some((caps[2].to_string(), caps[1].to_string()))
        } else {
            MARK_RE
                .captures(line)
                .map(|caps| (caps[2].to_string(), normalize_mark(&caps[1]).to_string()))
        };

        if let Some((umaban, grade)) = found {
            if let Ok(umaban) = umaban.parse::<u8>() {
                if umaban > 0 {
                    grades.entry(umaban).or_insert(grade);
                }
            }
        }
    }

    grades
}

fn normalize_mark(mark: &str) -> &str {
    match mark {
        "〇" => "○",
        "×" => "✕",
        other => other,
    }
}

/// Render the head-to-head table as text with graded header cells
pub fn render(table: &MatchupTable, grades: &BTreeMap<u8, String>) -> String {
    if table.is_empty() {
        return "対戦成績なし（出走馬同士の過去の対戦はありません）".to_string();
    }

    let mut out = String::from("【対戦表】\n");
    let header: Vec<String> = table
        .horses
        .iter()
        .map(|(umaban, name)| {
            let grade = grades.get(umaban).map(String::as_str).unwrap_or(NO_GRADE);
            format!("{}{}[{}]", umaban, name, grade)
        })
        .collect();
    let _ = writeln!(out, "日付 | レース | {}", header.join(" | "));

    for row in &table.rows {
        let cells: Vec<&str> = (0..table.horses.len())
            .map(|i| {
                row.positions
                    .get(i)
                    .and_then(|p| p.as_deref())
                    .unwrap_or("-")
            })
            .collect();
        let _ = writeln!(out, "{} | {} | {}", row.date, row.race, cells.join(" | "));
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::parsers::matchup::MatchupRow;

    #[test]
    fn test_parse_grades_formats() {
        let reply = "\
本命候補
3番 サンプルホース 評価:A
◎ 5 ストロング
[S] 7 エース
〇 9 テスト
10番 ラスト 評価：E";
        let grades = parse_grades(reply);
        assert_eq!(grades.get(&3).map(String::as_str), Some("A"));
        assert_eq!(grades.get(&5).map(String::as_str), Some("◎"));
        assert_eq!(grades.get(&7).map(String::as_str), Some("S"));
        assert_eq!(grades.get(&9).map(String::as_str), Some("○"));
        assert_eq!(grades.get(&10).map(String::as_str), Some("E"));
        assert_eq!(grades.len(), 5);
    }

    #[test]
    fn test_first_grade_wins() {
        let grades = parse_grades("3番 評価:B\n総合\n3番 評価:S\n▲ 3 again");
        assert_eq!(grades.get(&3).map(String::as_str), Some("B"));
    }

    #[test]
    fn test_ignores_prose() {
        let grades = parse_grades("2024年の傾向\n先行有利。\n評価:A が多い");
        assert!(grades.is_empty());
    }

    #[test]
    fn test_render_table() {
        let table = MatchupTable {
            horses: vec![(1, "アルファ".to_string()), (4, "ベータ".to_string())],
            rows: vec![MatchupRow {
                date: "2023/12/29".to_string(),
                race: "大井11R".to_string(),
                positions: vec![Some("2".to_string()), None],
            }],
        };
        let mut grades = BTreeMap::new();
        grades.insert(1, "A".to_string());

        let text = render(&table, &grades);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "【対戦表】");
        assert_eq!(lines[1], "日付 | レース | 1アルファ[A] | 4ベータ[-]");
        assert_eq!(lines[2], "2023/12/29 | 大井11R | 2 | -");
    }

    #[test]
    fn test_render_empty() {
        let text = render(&MatchupTable::default(), &BTreeMap::new());
        assert!(text.starts_with("対戦成績なし"));
    }
}
