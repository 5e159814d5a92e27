//! Application configuration for Snapvault.
//!
//! User config lives at `~/.snapvault/snapvault.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapvaultError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "snapvault.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".snapvault";

// ---------------------------------------------------------------------------
// Config structs (matching snapvault.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fetch pipeline settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Index pipeline settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Encoder service settings.
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Search index (document store) settings.
    #[serde(default)]
    pub search_index: SearchIndexConfig,
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Newline-delimited URL list, re-read every round.
    #[serde(default = "default_url_file")]
    pub url_file: String,

    /// Directory holding downloaded image objects.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Maximum simultaneous in-flight downloads.
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,

    /// Seconds slept between rounds.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url_file: default_url_file(),
            vault_dir: default_vault_dir(),
            concurrency: default_fetch_concurrency(),
            poll_seconds: default_poll_seconds(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_url_file() -> String {
    "~/snapvault/urls.txt".into()
}
fn default_vault_dir() -> String {
    "~/snapvault/images".into()
}
fn default_fetch_concurrency() -> usize {
    32
}
fn default_poll_seconds() -> u64 {
    30
}
fn default_request_timeout() -> u64 {
    30
}

/// `[index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory scanned for images to embed; normally the fetch vault.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Maximum simultaneous in-flight embed/index operations.
    #[serde(default = "default_index_concurrency")]
    pub concurrency: usize,

    /// Seconds slept between rounds.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            concurrency: default_index_concurrency(),
            poll_seconds: default_poll_seconds(),
        }
    }
}

fn default_index_concurrency() -> usize {
    4
}

/// `[encoder]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Base URL of the embedding service.
    #[serde(default = "default_encoder_endpoint")]
    pub endpoint: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retry budget for transient encoder failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_encoder_endpoint(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_encoder_endpoint() -> String {
    "http://localhost:8500".into()
}
fn default_max_retries() -> usize {
    3
}

/// `[search_index]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexConfig {
    /// Document store base URL.
    #[serde(default = "default_search_host")]
    pub host: String,

    /// Index name holding image documents.
    #[serde(default = "default_index_name")]
    pub index: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// ANN candidate pool size for knn queries.
    #[serde(default = "default_knn_candidates")]
    pub knn_candidates: usize,

    /// Default number of results returned by a query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            host: default_search_host(),
            index: default_index_name(),
            request_timeout_secs: default_request_timeout(),
            knn_candidates: default_knn_candidates(),
            top_k: default_top_k(),
        }
    }
}

fn default_search_host() -> String {
    "http://localhost:9200".into()
}
fn default_index_name() -> String {
    "images".into()
}
fn default_knn_candidates() -> usize {
    100
}
fn default_top_k() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject values the pipelines cannot run with. Called once at
    /// startup; the only place a config error is fatal.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(SnapvaultError::config("fetch.concurrency must be at least 1"));
        }
        if self.index.concurrency == 0 {
            return Err(SnapvaultError::config("index.concurrency must be at least 1"));
        }
        if self.fetch.poll_seconds == 0 {
            return Err(SnapvaultError::config("fetch.poll_seconds must be positive"));
        }
        if self.index.poll_seconds == 0 {
            return Err(SnapvaultError::config("index.poll_seconds must be positive"));
        }
        if self.search_index.top_k == 0 {
            return Err(SnapvaultError::config("search_index.top_k must be at least 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.snapvault/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SnapvaultError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.snapvault/snapvault.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SnapvaultError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SnapvaultError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SnapvaultError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SnapvaultError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SnapvaultError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
