//! Application configuration for capwatch.
//!
//! User config lives at `~/.capwatch/capwatch.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CapwatchError, Result};
use crate::types::Competitor;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "capwatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".capwatch";

/// Highest (least important) priority tier.
pub const MAX_PRIORITY: u8 = 3;

// ---------------------------------------------------------------------------
// Config structs (matching capwatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Fetch and discovery limits.
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// LLM classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Scheduled crawling.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Replaces the built-in competitor registry when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competitors: Vec<Competitor>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the state/event database. `~` is expanded.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Default priority tier for discover/crawl.
    #[serde(default = "default_priority")]
    pub priority: u8,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            priority: default_priority(),
        }
    }
}

fn default_db_path() -> String {
    "~/.capwatch/capwatch.db".into()
}
fn default_priority() -> u8 {
    1
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Global cap on in-flight fetches and source workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum ms between requests to the same host.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Upper bound on sources kept per competitor.
    #[serde(default = "default_max_sources")]
    pub max_sources_per_competitor: usize,

    /// Upper bound on discovered sources kept per category.
    #[serde(default = "default_max_per_category")]
    pub max_sources_per_category: usize,

    /// Allow fetching loopback/private hosts (test servers only).
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Override the default User-Agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            rate_limit_ms: default_rate_limit(),
            max_sources_per_competitor: default_max_sources(),
            max_sources_per_category: default_max_per_category(),
            allow_private_hosts: false,
            user_agent: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_concurrency() -> u32 {
    4
}
fn default_rate_limit() -> u64 {
    1000
}
fn default_max_sources() -> usize {
    15
}
fn default_max_per_category() -> usize {
    5
}

/// `[classifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// `openrouter` or `none`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model ID sent with each classification request.
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_classifier_timeout() -> u64 {
    30
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between scheduled crawls in `watch` mode.
    #[serde(default = "default_interval")]
    pub interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval(),
        }
    }
}

fn default_interval() -> u64 {
    360
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum concurrent HTTP requests / source workers.
    pub concurrency: u32,
    /// Minimum ms between requests to the same host.
    pub rate_limit_ms: u64,
    /// Per-competitor source cap.
    pub max_sources_per_competitor: usize,
    /// Per-category cap on discovered links.
    pub max_sources_per_category: usize,
    /// Allow loopback/private hosts.
    pub allow_private_hosts: bool,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Classifier call timeout in seconds.
    pub classify_timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.crawl.timeout_secs,
            concurrency: config.crawl.concurrency,
            rate_limit_ms: config.crawl.rate_limit_ms,
            max_sources_per_competitor: config.crawl.max_sources_per_competitor,
            max_sources_per_category: config.crawl.max_sources_per_category,
            allow_private_hosts: config.crawl.allow_private_hosts,
            user_agent: config.crawl.user_agent.clone(),
            classify_timeout_secs: config.classifier.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.capwatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| CapwatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.capwatch/capwatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CapwatchError::io(path, e))?;
    parse_config(&content)
        .map_err(|e| CapwatchError::config(format!("{}: {e}", path.display())))
}

/// Parse and validate config TOML.
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content)
        .map_err(|e| CapwatchError::config(format!("failed to parse config: {e}")))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reject values the crawler cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    validate_priority(config.defaults.priority)?;
    if config.crawl.concurrency == 0 {
        return Err(CapwatchError::config("crawl.concurrency must be at least 1"));
    }
    for competitor in &config.competitors {
        if !(1..=MAX_PRIORITY).contains(&competitor.priority) {
            return Err(CapwatchError::config(format!(
                "competitor '{}' has priority {}, expected 1..={MAX_PRIORITY}",
                competitor.name, competitor.priority
            )));
        }
    }
    Ok(())
}

/// Check a priority tier is in range.
pub fn validate_priority(priority: u8) -> Result<()> {
    if (1..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(CapwatchError::validation(format!(
            "priority {priority} out of range, expected 1..={MAX_PRIORITY}"
        )))
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CapwatchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CapwatchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CapwatchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CapwatchError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read the classifier API key from the configured env var, if set and non-empty.
pub fn classifier_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.classifier.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
}
