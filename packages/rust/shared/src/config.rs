//! Application configuration for convoreplay.
//!
//! User config lives at `~/.convoreplay/convoreplay.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "convoreplay.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".convoreplay";

// ---------------------------------------------------------------------------
// Config structs (matching convoreplay.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Source adapter settings.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Context prefetch settings.
    #[serde(default)]
    pub prefetch: PrefetchSection,
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Base URL of the hosting API (gists and repository contents).
    #[serde(default = "default_api_base")]
    pub github_api_base: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Query parameter that names a file locator's companion context map.
    #[serde(default = "default_context_param")]
    pub context_param: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            github_api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            context_param: default_context_param(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_context_param() -> String {
    "context".into()
}

/// `[prefetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchSection {
    /// Maximum retrievals in flight during one drain cycle.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Pause between drain cycles.
    #[serde(default = "default_cycle_delay_ms")]
    pub cycle_delay_ms: u64,

    /// Per-item request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PrefetchSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            cycle_delay_ms: default_cycle_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_concurrent() -> usize {
    3
}
fn default_cycle_delay_ms() -> u64 {
    100
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime settings shared by the source adapters.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Hosting API base, without trailing slash.
    pub api_base: String,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
    /// Query parameter naming the context map.
    pub context_param: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SourceOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            api_base: config.sources.github_api_base.trim_end_matches('/').to_string(),
            timeout_secs: config.sources.timeout_secs,
            context_param: config.sources.context_param.clone(),
        }
    }
}

/// Runtime settings for the prefetch scheduler.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    /// Concurrency bound per drain cycle.
    pub max_concurrent: usize,
    /// Pause between drain cycles in ms.
    pub cycle_delay_ms: u64,
    /// Per-item request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PrefetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.prefetch.max_concurrent.max(1),
            cycle_delay_ms: config.prefetch.cycle_delay_ms,
            timeout_secs: config.prefetch.timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.convoreplay/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ReplayError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.convoreplay/convoreplay.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ReplayError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ReplayError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ReplayError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ReplayError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ReplayError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
