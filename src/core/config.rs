//! Application configuration loaded from YAML, with environment-variable
//! fallbacks for secrets.

use anyhow::{Context, Result};
use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_eastmoney_url")]
    pub eastmoney_base_url: String,
    #[serde(default = "default_sina_url")]
    pub sina_base_url: String,
    #[serde(default = "default_tushare_url")]
    pub tushare_base_url: String,
    /// Token for the tushare adapter; the adapter is skipped when absent.
    pub tushare_token: Option<String>,
}

fn default_eastmoney_url() -> String {
    "https://fundapi.eastmoney.com".to_string()
}

fn default_sina_url() -> String {
    "https://hq.sinajs.cn".to_string()
}

fn default_tushare_url() -> String {
    "https://api.tushare.pro".to_string()
}

impl ProvidersConfig {
    /// Token resolution mirrors the oracle key: environment first, then the
    /// config file. Unlike the oracle key, absence is not fatal.
    pub fn resolved_tushare_token(&self) -> Option<String> {
        std::env::var("TUSHARE_TOKEN")
            .ok()
            .or_else(|| self.tushare_token.clone())
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            eastmoney_base_url: default_eastmoney_url(),
            sina_base_url: default_sina_url(),
            tushare_base_url: default_tushare_url(),
            tushare_token: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_oracle_url")]
    pub base_url: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_oracle_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_oracle_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            api_key: None,
            base_url: default_oracle_url(),
            model: default_oracle_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

impl OracleConfig {
    /// Resolves the API key from environment or config. Missing credentials
    /// are fatal: the session must fail fast before any pipeline stage runs.
    pub fn require_api_key(&self) -> Result<String> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .or_else(|| self.api_key.clone())
            .context(
                "Oracle API key is not configured. \
                 Set the ANTHROPIC_API_KEY environment variable or the \
                 `oracle.api_key` entry in the config file.",
            )
    }
}

/// Cache freshness windows per capability. A cached record younger than its
/// TTL is served without any provider call.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TtlConfig {
    #[serde(default = "default_list_hours")]
    pub fund_list_hours: i64,
    #[serde(default = "default_nav_hours")]
    pub nav_hours: i64,
    #[serde(default = "default_basic_info_days")]
    pub basic_info_days: i64,
    #[serde(default = "default_holdings_days")]
    pub holdings_days: i64,
    #[serde(default = "default_rating_days")]
    pub rating_days: i64,
}

fn default_list_hours() -> i64 {
    24
}

fn default_nav_hours() -> i64 {
    24
}

fn default_basic_info_days() -> i64 {
    7
}

fn default_holdings_days() -> i64 {
    30
}

fn default_rating_days() -> i64 {
    7
}

impl Default for TtlConfig {
    fn default() -> Self {
        TtlConfig {
            fund_list_hours: default_list_hours(),
            nav_hours: default_nav_hours(),
            basic_info_days: default_basic_info_days(),
            holdings_days: default_holdings_days(),
            rating_days: default_rating_days(),
        }
    }
}

impl TtlConfig {
    pub fn fund_list(&self) -> Duration {
        Duration::hours(self.fund_list_hours)
    }

    pub fn nav(&self) -> Duration {
        Duration::hours(self.nav_hours)
    }

    pub fn basic_info(&self) -> Duration {
        Duration::days(self.basic_info_days)
    }

    pub fn holdings(&self) -> Duration {
        Duration::days(self.holdings_days)
    }

    pub fn rating(&self) -> Duration {
        Duration::days(self.rating_days)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "fundrec")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "fundrec")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
