//! Site adapters for nankankeiba.com, keiba.go.jp and the keibabook
//! subscription site.
//!
//! Provides page fetching, browser automation and HTML parsing.

pub mod authority;
pub mod browser;
pub mod cache;
pub mod http;
pub mod keibabook;
pub mod nankan;
pub mod parsers;

pub use authority::AuthorityClient;
pub use http::HttpFetcher;
pub use keibabook::KeibabookClient;
pub use nankan::NankanClient;

use crate::types::{RaceDay, RaceKey};

/// Build the day program URL on the portal
pub fn program_url(base: &str, day: &RaceDay) -> String {
    format!(
        "{}/program/{}{:02}.do",
        base,
        day.compact_date(),
        day.place.venue_code()
    )
}

/// Build the per-horse detail URL on the portal
pub fn detail_url(base: &str, key: &RaceKey) -> String {
    format!("{}/uma_shosai/{}.do", base, key.portal_id())
}

/// Build the head-to-head URL on the portal
pub fn matchup_url(base: &str, key: &RaceKey) -> String {
    format!("{}/taisen/{}.do", base, key.portal_id())
}

/// Build the race card URL on keiba.go.jp; query parameters are added by the caller
pub fn race_card_url(base: &str) -> String {
    format!("{}/TodayRaceInfo/DebaTable", base)
}

/// Build the login URL on the subscription site
pub fn keibabook_login_url(base: &str) -> String {
    format!("{}/login/login", base)
}

/// Race id on the subscription site: year, course, kai, nichi, race, month-day
pub fn keibabook_race_id(key: &RaceKey) -> String {
    format!(
        "{}{}{:02}{:02}{:02}{}",
        key.day.date.format("%Y"),
        key.day.place.ui_code(),
        key.meeting.kai,
        key.meeting.nichi,
        key.race,
        key.day.date.format("%m%d")
    )
}

/// Build the training page URL on the subscription site
pub fn keibabook_training_url(base: &str, key: &RaceKey) -> String {
    format!("{}/chihou/cyokyo/{}", base, keibabook_race_id(key))
}
