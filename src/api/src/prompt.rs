//! Prompt assembly for the prediction workflow.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::normalize::normalize_name;
use crate::resources::Resources;
use crate::scraper::parsers::{CardEntry, HorseDetail, RaceCard, RaceDetail, TrainingNote};
use crate::types::RaceDay;

/// Build the full prompt for one race.
///
/// Runners are ordered by umaban. A runner that only appears on the race
/// card still gets a block built from the card columns, with its names
/// resolved against the reference lists.
pub fn build_prompt(
    day: &RaceDay,
    race: u8,
    detail: &RaceDetail,
    card: Option<&RaceCard>,
    training: &BTreeMap<u8, TrainingNote>,
    resources: &Resources,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "【{} {} {}R】", day.slash_date(), day.place, race);

    let title = if detail.meta.race_name.is_empty() {
        card.map(|c| c.title.as_str()).unwrap_or_default()
    } else {
        detail.meta.race_name.as_str()
    };
    if !title.is_empty() {
        let _ = writeln!(out, "レース名: {}", title);
    }
    if !detail.meta.grade.is_empty() {
        let _ = writeln!(out, "格付け: {}", detail.meta.grade);
    }
    if !detail.meta.course.is_empty() {
        let _ = writeln!(out, "コース: {}", detail.meta.course);
    }

    let mut umabans: BTreeSet<u8> = detail.horses.keys().copied().collect();
    if let Some(card) = card {
        umabans.extend(card.entries.iter().map(|e| e.umaban));
    }

    for umaban in umabans {
        let entry = card.and_then(|c| c.entry(umaban));
        out.push('\n');
        match detail.horses.get(&umaban) {
            Some(horse) => write_detail_block(&mut out, horse, entry),
            None => {
                if let Some(entry) = entry {
                    write_card_block(&mut out, entry, day.place.name(), resources);
                }
            }
        }
        if let Some(note) = training.get(&umaban) {
            let summary = note.summary();
            if !summary.is_empty() {
                let _ = writeln!(out, "調教: {}", summary);
            }
        }
    }

    out.trim_end().to_string()
}

fn write_detail_block(out: &mut String, horse: &HorseDetail, entry: Option<&CardEntry>) {
    let name = if horse.name.is_empty() {
        entry.map(|e| e.horse_name.as_str()).unwrap_or_default()
    } else {
        horse.name.as_str()
    };
    let _ = write!(
        out,
        "{}番 {} 騎手:{} 厩舎:{}",
        horse.umaban, name, horse.jockey, horse.trainer
    );
    if let Some(weight) = entry.and_then(|e| e.weight_carried) {
        let _ = write!(out, " 斤量:{}", weight);
    }
    out.push('\n');

    if !horse.display_power.is_empty() {
        let _ = writeln!(out, "{}", horse.display_power);
    }
    if horse.history.is_empty() {
        out.push_str("近走: なし\n");
    } else {
        out.push_str("近走:\n");
        for line in &horse.history {
            let _ = writeln!(out, "  {}", line);
        }
    }
}

fn write_card_block(out: &mut String, entry: &CardEntry, place: &str, resources: &Resources) {
    let jockey = normalize_name(&entry.jockey, &resources.jockeys);
    let trainer = normalize_name(&entry.trainer, &resources.trainers);
    let _ = write!(
        out,
        "{}番 {} 騎手:{} 厩舎:{}",
        entry.umaban, entry.horse_name, jockey, trainer
    );
    if let Some(weight) = entry.weight_carried {
        let _ = write!(out, " 斤量:{}", weight);
    }
    out.push('\n');
    let _ = writeln!(out, "【騎手】{}", resources.power_label(place, &jockey));
    out.push_str("近走: なし\n");
}
