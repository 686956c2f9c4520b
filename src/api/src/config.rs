//! Configuration for the Nankan API.

use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Dify workflow API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifyConfig {
    #[serde(default = "default_dify_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    /// Workflow input variable that receives the prompt
    #[serde(default = "default_input_key")]
    pub input_key: String,
    /// Workflow output variable holding the answer
    #[serde(default = "default_output_key")]
    pub output_key: String,
    #[serde(default = "default_dify_user")]
    pub user: String,
    /// Prefer SSE streaming over a blocking call
    #[serde(default)]
    pub streaming: bool,
    #[serde(default = "default_blocking_timeout")]
    pub blocking_timeout_secs: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_secs: u64,
    #[serde(default = "default_dify_retries")]
    pub max_retries: u32,
}

fn default_dify_base_url() -> String {
    "https://api.dify.ai/v1".to_string()
}

fn default_input_key() -> String {
    "text".to_string()
}

fn default_output_key() -> String {
    "text".to_string()
}

fn default_dify_user() -> String {
    "nankan-api".to_string()
}

fn default_blocking_timeout() -> u64 {
    300
}

fn default_stream_timeout() -> u64 {
    600
}

fn default_dify_retries() -> u32 {
    3
}

impl Default for DifyConfig {
    fn default() -> Self {
        Self {
            base_url: default_dify_base_url(),
            api_key: String::new(),
            input_key: default_input_key(),
            output_key: default_output_key(),
            user: default_dify_user(),
            streaming: false,
            blocking_timeout_secs: default_blocking_timeout(),
            stream_timeout_secs: default_stream_timeout(),
            max_retries: default_dify_retries(),
        }
    }
}

/// Base URLs and credentials for the scraped sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitesConfig {
    #[serde(default = "default_nankan_url")]
    pub nankan_url: String,
    #[serde(default = "default_authority_url")]
    pub authority_url: String,
    #[serde(default = "default_keibabook_url")]
    pub keibabook_url: String,
    #[serde(default)]
    pub keibabook_login_id: Option<String>,
    #[serde(default)]
    pub keibabook_password: Option<String>,
}

fn default_nankan_url() -> String {
    "https://www.nankankeiba.com".to_string()
}

fn default_authority_url() -> String {
    "https://www.keiba.go.jp/KeibaWeb".to_string()
}

fn default_keibabook_url() -> String {
    "https://s.keibabook.co.jp".to_string()
}

impl Default for SitesConfig {
    fn default() -> Self {
        Self {
            nankan_url: default_nankan_url(),
            authority_url: default_authority_url(),
            keibabook_url: default_keibabook_url(),
            keibabook_login_id: None,
            keibabook_password: None,
        }
    }
}

impl SitesConfig {
    /// Credentials for the subscription site, if both are set
    pub fn keibabook_credentials(&self) -> Option<(&str, &str)> {
        match (&self.keibabook_login_id, &self.keibabook_password) {
            (Some(id), Some(pw)) if !id.is_empty() && !pw.is_empty() => {
                Some((id.as_str(), pw.as_str()))
            }
            _ => None,
        }
    }
}

/// Reference data files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default = "default_jockey_file")]
    pub jockey_file: String,
    #[serde(default = "default_trainer_file")]
    pub trainer_file: String,
    #[serde(default = "default_power_file")]
    pub power_file: String,
}

fn default_jockey_file() -> String {
    "data/jockeys.csv".to_string()
}

fn default_trainer_file() -> String {
    "data/trainers.csv".to_string()
}

fn default_power_file() -> String {
    "data/jockey_power.csv".to_string()
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            jockey_file: default_jockey_file(),
            trainer_file: default_trainer_file(),
            power_file: default_power_file(),
        }
    }
}

/// HTTP scraping behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Minimum spacing between requests to the same site
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default)]
    pub chrome_executable: Option<String>,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_delay_ms() -> u64 {
    1000
}

fn default_cache_dir() -> String {
    "data/cache/pages".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout(),
            delay_ms: default_delay_ms(),
            cache_dir: default_cache_dir(),
            cache_enabled: default_cache_enabled(),
            chrome_executable: None,
        }
    }
}

/// Where saved results go
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dify: DifyConfig,
    #[serde(default)]
    pub sites: SitesConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from .env, config file and environment
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (NANKAN_DIFY__API_KEY, etc.)
            .add_source(
                config::Environment::with_prefix("NANKAN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
