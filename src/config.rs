use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub omdb: OmdbConfig,
  /// Term searched when the input is blank
  #[serde(default = "default_query")]
  pub default_query: String,
  /// Quiet window before a keystroke becomes a search, in milliseconds
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
  /// Page size for cache-backed listings (OMDb pages are fixed at 10)
  #[serde(default = "default_page_size")]
  pub page_size: usize,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OmdbConfig {
  #[serde(default = "default_omdb_url")]
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to run network-only with nothing persisted
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database location (default: $XDG_DATA_HOME/flick/cache.db)
  pub path: Option<PathBuf>,
}

fn default_query() -> String {
  "batman".to_string()
}

fn default_debounce_ms() -> u64 {
  1000
}

fn default_page_size() -> usize {
  10
}

fn default_omdb_url() -> String {
  "https://www.omdbapi.com/".to_string()
}

fn default_true() -> bool {
  true
}

impl Default for Config {
  fn default() -> Self {
    Self {
      omdb: OmdbConfig::default(),
      default_query: default_query(),
      debounce_ms: default_debounce_ms(),
      page_size: default_page_size(),
      cache: CacheConfig::default(),
    }
  }
}

impl Default for OmdbConfig {
  fn default() -> Self {
    Self {
      url: default_omdb_url(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./flick.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/flick/config.yaml
  ///
  /// Every field has a default, so a missing config file just means the
  /// defaults (the API key comes from the environment either way).
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("flick.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("flick").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the OMDb API key from environment variables.
  ///
  /// Checks FLICK_OMDB_API_KEY first, then OMDB_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("FLICK_OMDB_API_KEY")
      .or_else(|_| std::env::var("OMDB_API_KEY"))
      .map_err(|_| {
        eyre!("OMDb API key not found. Set FLICK_OMDB_API_KEY or OMDB_API_KEY environment variable.")
      })
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}
