//! Abbreviated jockey/trainer name resolution.
//!
//! Race pages show shortened names ("森泰", "御神本") and sometimes carry
//! weight-allowance marks or the carried weight. These are matched against
//! the full-name lists by character inclusion.

use regex::Regex;
use std::sync::LazyLock;

static NOISE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ 　▲△☆◇★\d\.]+").expect("valid regex"));

/// Remove spaces, apprentice marks, digits and dots
pub fn clean_name(raw: &str) -> String {
    NOISE_RE.replace_all(raw, "").into_owned()
}

/// Resolve an abbreviated name to the closest full name.
///
/// A full name is a candidate when it contains every character of the
/// cleaned abbreviation; the candidate with the fewest extra characters
/// wins, earlier list entries winning ties. Falls back to the cleaned
/// abbreviation.
pub fn normalize_name(abbrev: &str, full_list: &[String]) -> String {
    if abbrev.is_empty() {
        return String::new();
    }
    let clean = clean_name(abbrev);
    if clean.is_empty() || full_list.is_empty() {
        return clean;
    }
    if full_list.iter().any(|full| *full == clean) {
        return clean;
    }

    let clean_len = clean.chars().count();
    full_list
        .iter()
        .filter(|full| clean.chars().all(|c| full.contains(c)))
        .min_by_key(|full| full.chars().count().saturating_sub(clean_len))
        .cloned()
        .unwrap_or(clean)
}
