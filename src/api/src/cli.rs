//! CLI commands for nankan-api.
//!
//! Supports one-shot runs printed to the terminal, meeting lookup and the
//! HTTP server mode.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::AppConfig;
use crate::resources::Resources;
use crate::runner;
use crate::scraper::cache::PageCache;
use crate::scraper::{HttpFetcher, NankanClient};
use crate::types::{Place, RaceDay, RunEvent, RunMode, RunRequest};

/// Width of the separator lines in the summary
const RULE_WIDTH: usize = 35;

#[derive(Parser)]
#[command(name = "nankan-api")]
#[command(version, about = "Nankan racing: data collection, AI prediction and head-to-head tables", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Collect data (and optionally predict) for races of one day
    Run {
        /// Race date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Racecourse (大井, 川崎, 船橋, 浦和 or oi/kawasaki/funabashi/urawa)
        #[arg(short = 'P', long)]
        place: Place,

        /// Race numbers
        #[arg(short, long, value_delimiter = ',', default_value = "10,11,12")]
        races: Vec<u8>,

        /// Every race held on the day
        #[arg(short, long, conflicts_with = "races")]
        all: bool,

        /// dify (AI prediction) or raw (data only)
        #[arg(short, long, default_value = "dify")]
        mode: RunMode,

        /// Also write the results under the output directory
        #[arg(short, long)]
        save: bool,
    },

    /// Print the meeting (kai/nichi) for a race day
    Meeting {
        /// Race date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Racecourse
        #[arg(short = 'P', long)]
        place: Place,
    },

    /// Delete every cached page
    ClearCache,
}

fn day_of(date: Option<NaiveDate>, place: Place) -> RaceDay {
    RaceDay::new(date.unwrap_or_else(|| Local::now().date_naive()), place)
}

/// Print the resolved meeting for a day.
pub async fn run_meeting(date: Option<NaiveDate>, place: Place) -> Result<()> {
    let config = AppConfig::load()?;
    let day = day_of(date, place);

    let client = NankanClient::new(HttpFetcher::new(&config.scraper)?, &config.sites.nankan_url);
    let meeting = client.resolve_meeting(&day).await?;
    let races = client.list_races(&day).await?;

    println!("{} {}", day.slash_date(), day.place);
    println!("  第{}回 {}日目", meeting.kai, meeting.nichi);
    if !races.is_empty() {
        let races: Vec<String> = races.iter().map(|r| format!("{}R", r)).collect();
        println!("  {}", races.join(" "));
    }
    Ok(())
}

/// Remove the on-disk page cache.
pub fn run_clear_cache() -> Result<()> {
    let config = AppConfig::load()?;
    PageCache::new(&config.scraper.cache_dir).clear_all()?;
    eprintln!("Cleared {}", config.scraper.cache_dir);
    Ok(())
}

/// Races held on the day, or 1-12 when the program page lists none
async fn all_races(config: &AppConfig, day: &RaceDay) -> Vec<u8> {
    let listed = match HttpFetcher::new(&config.scraper) {
        Ok(fetcher) => NankanClient::new(fetcher, &config.sites.nankan_url)
            .list_races(day)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to list races: {:#}", e);
                Vec::new()
            }),
        Err(e) => {
            warn!("Failed to build HTTP client: {}", e);
            Vec::new()
        }
    };
    if listed.is_empty() {
        (1..=12).collect()
    } else {
        listed
    }
}

/// Run the selected races and print the results.
pub async fn run_races(
    date: Option<NaiveDate>,
    place: Place,
    races: Vec<u8>,
    all: bool,
    mode: RunMode,
    save: bool,
) -> Result<()> {
    let config = AppConfig::load()?;
    let resources = Resources::global(&config.resources);
    let day = day_of(date, place);

    let races = if all { all_races(&config, &day).await } else { races };
    let request = RunRequest {
        date: day.date,
        place,
        races,
        mode,
    };

    let (tx, mut rx) = mpsc::channel(32);
    let run = runner::run_races(&config, resources, &request, tx);
    let print = async {
        let mut results = BTreeMap::new();
        let mut errors = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::Status(message) => eprintln!("{}", message),
                RunEvent::Error(message) => {
                    errors += 1;
                    eprintln!("❌ {}", message);
                }
                RunEvent::Result { race, text } => {
                    println!("{} {}R", day.place, race);
                    println!("{}", "-".repeat(RULE_WIDTH));
                    println!("{}", text);
                    println!();
                    results.insert(race, text);
                }
            }
        }
        (results, errors)
    };
    let ((), (results, errors)) = tokio::join!(run, print);

    if results.is_empty() {
        anyhow::bail!("no race produced a result ({} errors)", errors);
    }

    let summary = format_summary(&day, &results);
    println!("{}", summary);

    if save {
        let dir = PathBuf::from(&config.output.dir);
        save_results(&dir, &day, &results, &summary)?;
        eprintln!("Saved results to {}", dir.display());
    }

    Ok(())
}

/// Every result in one copy-pasteable block
pub fn format_summary(day: &RaceDay, results: &BTreeMap<u8, String>) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = format!("【{} {} データまとめ】\n", day.slash_date(), day.place);
    for (race, text) in results {
        out.push_str(&format!(
            "\n{rule}\n {} {}R\n{rule}\n{}\n",
            day.place,
            race,
            text,
            rule = rule
        ));
    }
    out
}

fn save_results(
    dir: &Path,
    day: &RaceDay,
    results: &BTreeMap<u8, String>,
    summary: &str,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let prefix = format!("{}_{}", day.compact_date(), day.place.venue_code());
    for (race, text) in results {
        let path = dir.join(format!("{}_{:02}R.txt", prefix, race));
        std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    }
    let path = dir.join(format!("{}_summary.txt", prefix));
    std::fs::write(&path, summary).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
