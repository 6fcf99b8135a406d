//! Application configuration for papermill.
//!
//! User config lives at `~/.papermill/papermill.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PapermillError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "papermill.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".papermill";

// ---------------------------------------------------------------------------
// Config structs (matching papermill.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Completion service (OpenRouter) settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Web search API settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Scraping microservice settings.
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Sizing and prompt limits for the generation stages.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Upper bound on pipelines running at the same time in a batch.
    #[serde(default = "default_max_concurrent_pipelines")]
    pub max_concurrent_pipelines: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_concurrent_pipelines: default_max_concurrent_pipelines(),
        }
    }
}

fn default_database_path() -> String {
    "~/.papermill/papermill.db".into()
}
fn default_max_concurrent_pipelines() -> usize {
    4
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Model used by every generation stage.
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output cap for one completion call, in tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Long generations (whole chapters) can take minutes.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_openrouter_base_url(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    16_000
}
fn default_request_timeout_secs() -> u64 {
    600
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Env var holding the search API key.
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,

    /// Env var holding the custom search engine id (`cx`).
    #[serde(default = "default_engine_id_env")]
    pub engine_id_env: String,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Results requested per page. The API caps this at 10.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Total results kept across pages.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Pause between page requests, in milliseconds.
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_search_api_key_env(),
            engine_id_env: default_engine_id_env(),
            base_url: default_search_base_url(),
            page_size: default_page_size(),
            max_results: default_max_results(),
            page_delay_ms: default_page_delay_ms(),
        }
    }
}

fn default_search_api_key_env() -> String {
    "GOOGLE_SEARCH_API_KEY".into()
}
fn default_engine_id_env() -> String {
    "GOOGLE_SEARCH_ENGINE_ID".into()
}
fn default_search_base_url() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_page_size() -> u32 {
    10
}
fn default_max_results() -> u32 {
    15
}
fn default_page_delay_ms() -> u64 {
    1000
}

/// `[scraper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Base URL of the scraping microservice.
    #[serde(default = "default_scraper_base_url")]
    pub base_url: String,

    /// Per-URL request timeout.
    #[serde(default = "default_scraper_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause between two URLs, in milliseconds.
    #[serde(default = "default_scraper_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_scraper_base_url(),
            timeout_secs: default_scraper_timeout_secs(),
            delay_ms: default_scraper_delay_ms(),
        }
    }
}

fn default_scraper_base_url() -> String {
    "http://localhost:3001".into()
}
fn default_scraper_timeout_secs() -> u64 {
    30
}
fn default_scraper_delay_ms() -> u64 {
    2000
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// One outline header per this many target characters.
    #[serde(default = "default_chars_per_header")]
    pub chars_per_header: u32,

    #[serde(default = "default_min_headers")]
    pub min_headers: u32,

    #[serde(default = "default_max_headers")]
    pub max_headers: u32,

    /// Allowed relative deviation from the target length (0.2 = ±20%).
    #[serde(default = "default_length_tolerance")]
    pub length_tolerance: f64,

    /// Characters of each source shown to the selector.
    #[serde(default = "default_selection_snippet_chars")]
    pub selection_snippet_chars: usize,

    /// Characters of each selected source fed to the outline prompt.
    #[serde(default = "default_outline_source_chars")]
    pub outline_source_chars: usize,

    /// Characters of each selected source fed to content prompts.
    #[serde(default = "default_content_source_chars")]
    pub content_source_chars: usize,

    #[serde(default = "default_min_selected")]
    pub min_selected: usize,

    #[serde(default = "default_max_selected")]
    pub max_selected: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            chars_per_header: default_chars_per_header(),
            min_headers: default_min_headers(),
            max_headers: default_max_headers(),
            length_tolerance: default_length_tolerance(),
            selection_snippet_chars: default_selection_snippet_chars(),
            outline_source_chars: default_outline_source_chars(),
            content_source_chars: default_content_source_chars(),
            min_selected: default_min_selected(),
            max_selected: default_max_selected(),
        }
    }
}

fn default_chars_per_header() -> u32 {
    2000
}
fn default_min_headers() -> u32 {
    3
}
fn default_max_headers() -> u32 {
    20
}
fn default_length_tolerance() -> f64 {
    0.2
}
fn default_selection_snippet_chars() -> usize {
    500
}
fn default_outline_source_chars() -> usize {
    3000
}
fn default_content_source_chars() -> usize {
    4000
}
fn default_min_selected() -> usize {
    3
}
fn default_max_selected() -> usize {
    8
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.papermill/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| PapermillError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.papermill/papermill.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| PapermillError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PapermillError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PapermillError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PapermillError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PapermillError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PapermillError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read a required secret from the environment.
pub fn read_env_secret(var_name: &str, service: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PapermillError::config(format!(
            "{service} credential not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    read_env_secret(var_name, "OpenRouter").map_err(|_| {
        PapermillError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))
    })?;
    Ok(())
}
