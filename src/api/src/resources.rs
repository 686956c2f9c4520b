//! Reference data: jockey/trainer full-name lists and the jockey power table.
//!
//! Loaded once per process and shared read-only by the parsers.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::config::ResourcesConfig;

/// Global resources cache
static RESOURCES: OnceLock<Resources> = OnceLock::new();

const JOCKEY_COLUMN: &str = "騎手名";
const POWER_COLUMN: &str = "騎手パワー";

/// In-memory reference data
#[derive(Debug, Clone, Default)]
pub struct Resources {
    pub jockeys: Vec<String>,
    pub trainers: Vec<String>,
    /// (racecourse, jockey full name) -> power value as written in the table
    power: HashMap<(String, String), String>,
}

impl Resources {
    /// Load every file named in the config; missing files yield empty data
    pub fn load(config: &ResourcesConfig) -> Self {
        let jockeys = load_name_list(&config.jockey_file);
        let trainers = load_name_list(&config.trainer_file);
        let power = match load_power_table(&config.power_file) {
            Ok(table) => table,
            Err(e) => {
                warn!("Power table unavailable: {:#}", e);
                HashMap::new()
            }
        };

        info!(
            "Resources loaded: {} jockeys, {} trainers, {} power entries",
            jockeys.len(),
            trainers.len(),
            power.len()
        );

        Self {
            jockeys,
            trainers,
            power,
        }
    }

    /// Process-wide instance, loaded on first use
    pub fn global(config: &ResourcesConfig) -> &'static Resources {
        RESOURCES.get_or_init(|| Self::load(config))
    }

    /// Build from in-memory data
    #[cfg(test)]
    pub fn from_parts(
        jockeys: Vec<String>,
        trainers: Vec<String>,
        power: impl IntoIterator<Item = ((String, String), String)>,
    ) -> Self {
        Self {
            jockeys,
            trainers,
            power: power.into_iter().collect(),
        }
    }

    /// Raw power value for a jockey at a course
    pub fn power_value(&self, place: &str, jockey: &str) -> Option<&str> {
        self.power
            .get(&(place.to_string(), jockey.to_string()))
            .map(String::as_str)
    }

    /// `P:{value}` label, or `P:不明` when the jockey is not in the table
    pub fn power_label(&self, place: &str, jockey: &str) -> String {
        match self.power_value(place, jockey) {
            Some(v) => format!("P:{}", v),
            None => "P:不明".to_string(),
        }
    }
}

/// Strip separators and spaces the way the name lists are stored
fn clean_list_entry(line: &str) -> String {
    line.trim().replace([',', ' ', '\u{3000}'], "")
}

fn read_without_bom(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(content.trim_start_matches('\u{feff}').to_string())
}

/// Load a one-name-per-line list
pub fn load_name_list<P: AsRef<Path>>(path: P) -> Vec<String> {
    let path = path.as_ref();
    if !path.exists() {
        warn!("Name list not found: {}", path.display());
        return Vec::new();
    }

    match read_without_bom(path) {
        Ok(content) => parse_name_list(&content),
        Err(e) => {
            warn!("{:#}", e);
            Vec::new()
        }
    }
}

fn parse_name_list(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(clean_list_entry)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Load the power table keyed by (racecourse, jockey)
pub fn load_power_table<P: AsRef<Path>>(path: P) -> Result<HashMap<(String, String), String>> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("power table not found: {}", path.display());
    }
    let content = read_without_bom(path)?;
    parse_power_table(&content)
}

fn parse_power_table(content: &str) -> Result<HashMap<(String, String), String>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    // The racecourse is always the first column
    let jockey_idx = headers.iter().position(|h| h.trim() == JOCKEY_COLUMN);
    let power_idx = headers.iter().position(|h| h.trim() == POWER_COLUMN);

    let mut table = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let place = record.get(0).unwrap_or("").trim().to_string();
        let jockey = jockey_idx
            .and_then(|i| record.get(i))
            .unwrap_or("")
            .replace([' ', '\u{3000}'], "");
        if place.is_empty() || jockey.is_empty() {
            continue;
        }

        let value = power_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("-")
            .to_string();
        table.insert((place, jockey), value);
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWER_CSV: &str = "\u{feff}競馬場,順位,騎手名,騎手パワー\n大井,1,森 泰斗,85.2\n大井,2,御神本　訓史,80.1\n船橋,1,森泰斗,83.0\n川崎,3,,70\n浦和,4,笹川翼,\n";

    #[test]
    fn test_parse_name_list() {
        let list = parse_name_list("森 泰斗\n\n御神本　訓史,\n  矢野貴之  \n");
        assert_eq!(list, vec!["森泰斗", "御神本訓史", "矢野貴之"]);
    }

    #[test]
    fn test_parse_power_table() {
        let content = POWER_CSV.trim_start_matches('\u{feff}');
        let table = parse_power_table(content).unwrap();

        assert_eq!(table.len(), 4);
        assert_eq!(table[&("大井".to_string(), "森泰斗".to_string())], "85.2");
        assert_eq!(table[&("大井".to_string(), "御神本訓史".to_string())], "80.1");
        assert_eq!(table[&("船橋".to_string(), "森泰斗".to_string())], "83.0");
        // Empty power cell falls back to "-"
        assert_eq!(table[&("浦和".to_string(), "笹川翼".to_string())], "-");
    }

    #[test]
    fn test_power_label() {
        let resources = Resources::from_parts(
            vec![],
            vec![],
            [(("大井".to_string(), "森泰斗".to_string()), "85.2".to_string())],
        );
        assert_eq!(resources.power_label("大井", "森泰斗"), "P:85.2");
        assert_eq!(resources.power_label("川崎", "森泰斗"), "P:不明");
        assert_eq!(resources.power_value("大井", "森泰斗"), Some("85.2"));
    }

    #[test]
    fn test_load_missing_files() {
        let config = ResourcesConfig {
            jockey_file: "does/not/exist.csv".to_string(),
            trainer_file: "does/not/exist.csv".to_string(),
            power_file: "does/not/exist.csv".to_string(),
        };
        let resources = Resources::load(&config);
        assert!(resources.jockeys.is_empty());
        assert!(resources.trainers.is_empty());
        assert_eq!(resources.power_label("大井", "森泰斗"), "P:不明");
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let jockeys = dir.path().join("jockeys.csv");
        let power = dir.path().join("power.csv");
        std::fs::write(&jockeys, "\u{feff}森泰斗\n矢野貴之\n").unwrap();
        std::fs::write(&power, POWER_CSV).unwrap();

        let config = ResourcesConfig {
            jockey_file: jockeys.to_string_lossy().to_string(),
            trainer_file: dir.path().join("missing.csv").to_string_lossy().to_string(),
            power_file: power.to_string_lossy().to_string(),
        };
        let resources = Resources::load(&config);
        assert_eq!(resources.jockeys, vec!["森泰斗", "矢野貴之"]);
        assert!(resources.trainers.is_empty());
        assert_eq!(resources.power_label("船橋", "森泰斗"), "P:83.0");
    }
}
