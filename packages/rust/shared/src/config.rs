//! Application configuration for OnLeads.
//!
//! User config lives at `~/.onleads/onleads.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the environment
//! variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OnLeadsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "onleads.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".onleads";

/// Environment variables that override the Notion database ids.
const LEADS_DB_ENV: &str = "NOTION_LEADS_DATABASE_ID";
const EMAILS_DB_ENV: &str = "NOTION_EMAILS_DATABASE_ID";

// ---------------------------------------------------------------------------
// Config structs (matching onleads.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub notion: NotionConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub crawl: CrawlSettings,

    #[serde(default)]
    pub drafting: DraftingConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

/// Which CRM backend the store adapters talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Notion,
    Local,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the local backend. `~` expands to the home dir.
    #[serde(default = "default_local_path")]
    pub local_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            local_path: default_local_path(),
        }
    }
}

impl StoreConfig {
    /// Resolve `local_path`, expanding a leading `~/`.
    pub fn resolved_local_path(&self) -> Result<PathBuf> {
        match self.local_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    OnLeadsError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.local_path)),
        }
    }
}

fn default_local_path() -> String {
    "~/.onleads/onleads.db".into()
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Name of the env var holding the integration token.
    #[serde(default = "default_notion_token_env")]
    pub token_env: String,

    /// Leads database id. `NOTION_LEADS_DATABASE_ID` overrides it.
    #[serde(default)]
    pub leads_database_id: String,

    /// Emails database id. `NOTION_EMAILS_DATABASE_ID` overrides it.
    #[serde(default)]
    pub emails_database_id: String,

    #[serde(default = "default_notion_api_base")]
    pub api_base: String,

    /// Value sent in the `Notion-Version` header.
    #[serde(default = "default_notion_api_version")]
    pub api_version: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token_env: default_notion_token_env(),
            leads_database_id: String::new(),
            emails_database_id: String::new(),
            api_base: default_notion_api_base(),
            api_version: default_notion_api_version(),
        }
    }
}

impl NotionConfig {
    /// Read the integration token from its env var.
    pub fn token(&self) -> Result<String> {
        read_secret(&self.token_env).ok_or_else(|| {
            OnLeadsError::config(format!(
                "Notion token not found. Set the {} environment variable.",
                self.token_env
            ))
        })
    }

    /// Leads database id, env var first.
    pub fn leads_database(&self) -> Result<String> {
        resolve_database_id(LEADS_DB_ENV, &self.leads_database_id)
    }

    /// Emails database id, env var first.
    pub fn emails_database(&self) -> Result<String> {
        resolve_database_id(EMAILS_DB_ENV, &self.emails_database_id)
    }
}

fn resolve_database_id(env_name: &str, configured: &str) -> Result<String> {
    if let Some(id) = read_secret(env_name) {
        return Ok(id);
    }
    if !configured.trim().is_empty() {
        return Ok(configured.trim().to_string());
    }
    Err(OnLeadsError::config(format!(
        "{env_name} environment variable is required (or set it in {CONFIG_FILE_NAME})"
    )))
}

fn default_notion_token_env() -> String {
    "NOTION_TOKEN".into()
}
fn default_notion_api_base() -> String {
    "https://api.notion.com/v1".into()
}
fn default_notion_api_version() -> String {
    "2022-06-28".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible chat-completions API.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_generation_key_env(),
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    /// Read the API key from its env var.
    pub fn api_key(&self) -> Result<String> {
        read_secret(&self.api_key_env).ok_or_else(|| {
            OnLeadsError::config(format!(
                "text-generation API key not found. Set the {} environment variable.",
                self.api_key_env
            ))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_generation_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_generation_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout() -> u64 {
    60
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,

    /// Page text beyond this many characters is ignored.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,

    /// Allow fetching loopback/private addresses.
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_crawl_timeout(),
            max_content_chars: default_max_content_chars(),
            allow_private_hosts: false,
        }
    }
}

impl CrawlSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_crawl_timeout() -> u64 {
    30
}
fn default_max_content_chars() -> usize {
    30_000
}

/// Which leads `draft_all` considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Only leads whose contact status is still `New`.
    #[default]
    NewOnly,
    /// Every lead in the store.
    All,
}

/// `[drafting]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftingConfig {
    #[serde(default)]
    pub eligibility: Eligibility,
}

/// `[retry]` section. Applies to rate-limited store calls only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(16);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.onleads/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| OnLeadsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.onleads/onleads.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| OnLeadsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| OnLeadsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OnLeadsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OnLeadsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OnLeadsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a non-empty, trimmed environment variable.
pub fn read_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val.trim().to_string()),
        _ => None,
    }
}
