//! Core domain types shared by the scrapers, runner and surfaces.

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nankan racecourse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Place {
    #[serde(alias = "大井")]
    Oi,
    #[serde(alias = "川崎")]
    Kawasaki,
    #[serde(alias = "船橋")]
    Funabashi,
    #[serde(alias = "浦和")]
    Urawa,
}

impl Place {
    pub const ALL: [Place; 4] = [Place::Oi, Place::Kawasaki, Place::Funabashi, Place::Urawa];

    /// Japanese display name (also the key used in the power table)
    pub fn name(&self) -> &'static str {
        match self {
            Place::Oi => "大井",
            Place::Kawasaki => "川崎",
            Place::Funabashi => "船橋",
            Place::Urawa => "浦和",
        }
    }

    /// Code used by the race picker and the subscription site
    pub fn ui_code(&self) -> &'static str {
        match self {
            Place::Oi => "10",
            Place::Kawasaki => "11",
            Place::Funabashi => "12",
            Place::Urawa => "13",
        }
    }

    /// Venue code on nankankeiba.com
    pub fn venue_code(&self) -> u8 {
        match self {
            Place::Oi => 20,
            Place::Kawasaki => 21,
            Place::Funabashi => 19,
            Place::Urawa => 18,
        }
    }

    /// `k_babaCode` on keiba.go.jp
    pub fn baba_code(&self) -> u8 {
        // Same numbering as the portal for the four Nankan tracks
        self.venue_code()
    }
}

impl fmt::Display for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Place {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        for place in Place::ALL {
            if s == place.name() || s == place.ui_code() {
                return Ok(place);
            }
        }
        match s.to_ascii_lowercase().as_str() {
            "oi" | "ooi" | "tck" => Ok(Place::Oi),
            "kawasaki" => Ok(Place::Kawasaki),
            "funabashi" => Ok(Place::Funabashi),
            "urawa" => Ok(Place::Urawa),
            _ => bail!("unknown racecourse: {}", s),
        }
    }
}

/// A race day at one course
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceDay {
    pub date: NaiveDate,
    pub place: Place,
}

impl RaceDay {
    pub fn new(date: NaiveDate, place: Place) -> Self {
        Self { date, place }
    }

    /// `YYYYMMDD`
    pub fn compact_date(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// `YYYY/MM/DD`, the format used in headers and on keiba.go.jp
    pub fn slash_date(&self) -> String {
        format!(
            "{:04}/{:02}/{:02}",
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }
}

/// Meeting number and day number within the meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub kai: u8,
    pub nichi: u8,
}

/// Fully resolved race identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceKey {
    pub day: RaceDay,
    pub meeting: Meeting,
    pub race: u8,
}

impl RaceKey {
    /// `YYYYMMDD` + venue + kai + nichi + race, each two digits
    pub fn portal_id(&self) -> String {
        format!(
            "{}{:02}{:02}{:02}{:02}",
            self.day.compact_date(),
            self.day.place.venue_code(),
            self.meeting.kai,
            self.meeting.nichi,
            self.race
        )
    }
}

/// Execution mode for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Send the prompt to Dify and annotate the matchup table
    #[default]
    Dify,
    /// Only collect data and return the prompt text
    Raw,
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Dify => "AI予想",
            RunMode::Raw => "データ取得",
        }
    }
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dify" | "ai" => Ok(RunMode::Dify),
            "raw" | "data" => Ok(RunMode::Raw),
            other => bail!("unknown mode: {}", other),
        }
    }
}

/// Progress and output of a run, in emission order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum RunEvent {
    Status(String),
    Result { race: u8, text: String },
    Error(String),
}

impl RunEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Status(_) => "status",
            RunEvent::Result { .. } => "result",
            RunEvent::Error(_) => "error",
        }
    }
}

/// Request for a run over several races of one day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub date: NaiveDate,
    pub place: Place,
    pub races: Vec<u8>,
    #[serde(default)]
    pub mode: RunMode,
}

impl RunRequest {
    /// Sorted, de-duplicated race numbers; rejects anything outside 1..=12
    pub fn race_numbers(&self) -> Result<Vec<u8>> {
        let mut races = self.races.clone();
        races.sort_unstable();
        races.dedup();
        if races.is_empty() {
            bail!("no races selected");
        }
        if let Some(bad) = races.iter().find(|r| !(1..=12).contains(*r)) {
            bail!("race number out of range (1-12): {}", bad);
        }
        Ok(races)
    }

    pub fn day(&self) -> RaceDay {
        RaceDay::new(self.date, self.place)
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> RaceDay {
        RaceDay::new(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(), Place::Oi)
    }

    #[test]
    fn test_place_parsing() {
        assert_eq!("大井".parse::<Place>().unwrap(), Place::Oi);
        assert_eq!("12".parse::<Place>().unwrap(), Place::Funabashi);
        assert_eq!("Urawa".parse::<Place>().unwrap(), Place::Urawa);
        assert!("東京".parse::<Place>().is_err());
    }

    #[test]
    fn test_portal_id() {
        let key = RaceKey {
            day: day(),
            meeting: Meeting { kai: 1, nichi: 3 },
            race: 11,
        };
        assert_eq!(key.portal_id(), "2024010520010311");
    }

    #[test]
    fn test_dates() {
        assert_eq!(day().compact_date(), "20240105");
        assert_eq!(day().slash_date(), "2024/01/05");
    }

    #[test]
    fn test_race_numbers_sorted_and_deduped() {
        let req = RunRequest {
            date: day().date,
            place: Place::Oi,
            races: vec![12, 10, 11, 10],
            mode: RunMode::Raw,
        };
        assert_eq!(req.race_numbers().unwrap(), vec![10, 11, 12]);
    }

    #[test]
    fn test_race_numbers_rejects_out_of_range() {
        let req = RunRequest {
            date: day().date,
            place: Place::Oi,
            races: vec![0, 13],
            mode: RunMode::Raw,
        };
        assert!(req.race_numbers().is_err());

        let empty = RunRequest { races: vec![], ..req };
        assert!(empty.race_numbers().is_err());
    }

    #[test]
    fn test_request_accepts_japanese_place() {
        let req: RunRequest =
            serde_json::from_str(r#"{"date": "2024-01-05", "place": "船橋", "races": [11]}"#)
                .unwrap();
        assert_eq!(req.place, Place::Funabashi);
        assert_eq!(req.mode, RunMode::Dify);
    }

    #[test]
    fn test_event_serialization() {
        let ev = RunEvent::Result {
            race: 11,
            text: "ok".to_string(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["data"]["race"], 11);

        let status = serde_json::to_value(RunEvent::Status("x".into())).unwrap();
        assert_eq!(status["type"], "status");
        assert_eq!(status["data"], "x");
    }
}
