//! File-based page cache with TTL support.
//!
//! Entry pages change through the day (scratches, jockey changes), so
//! TTLs are short; the cache mainly saves re-fetching when the same races
//! are run again.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache entry with timestamp
#[derive(Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    body: String,
    cached_at: DateTime<Utc>,
}

/// Page kinds with different TTLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Program,   // 12 hours
    Detail,    // 1 hour
    Matchup,   // 1 hour
    RaceCard,  // 1 hour
}

impl PageKind {
    /// Get TTL duration
    pub fn ttl(&self) -> Duration {
        match self {
            PageKind::Program => Duration::hours(12),
            PageKind::Detail | PageKind::Matchup | PageKind::RaceCard => Duration::hours(1),
        }
    }

    /// Get directory name for this kind
    pub fn dir_name(&self) -> &str {
        match self {
            PageKind::Program => "program",
            PageKind::Detail => "detail",
            PageKind::Matchup => "matchup",
            PageKind::RaceCard => "race_card",
        }
    }
}

/// File-based cache
#[derive(Debug, Clone)]
pub struct PageCache {
    base_dir: PathBuf,
}

impl PageCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn cache_path(&self, kind: PageKind, key: &str) -> PathBuf {
        let safe_key: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.base_dir
            .join(kind.dir_name())
            .join(format!("{}.json", safe_key))
    }

    /// Cached body if present and fresh
    pub fn get(&self, kind: PageKind, key: &str) -> Option<String> {
        let path = self.cache_path(kind, key);
        if !path.exists() {
            return None;
        }

        let content = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry = serde_json::from_str(&content).ok()?;

        if Utc::now() - entry.cached_at > kind.ttl() {
            let _ = std::fs::remove_file(&path);
            return None;
        }

        Some(entry.body)
    }

    pub fn set(&self, kind: PageKind, key: &str, url: &str, body: &str) -> Result<()> {
        let path = self.cache_path(kind, key);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let entry = CacheEntry {
            url: url.to_string(),
            body: body.to_string(),
            cached_at: Utc::now(),
        };
        std::fs::write(&path, serde_json::to_string(&entry)?)?;

        Ok(())
    }

    /// Drop everything cached
    pub fn clear_all(&self) -> Result<()> {
        if self.base_dir.exists() {
            std::fs::remove_dir_all(&self.base_dir)?;
        }
        Ok(())
    }
}
