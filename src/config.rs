use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub properties: PropertiesConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

/// Where the process runs relative to the API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionContext {
  /// Talks to the API the way a browser would, through the public URL
  #[default]
  Client,
  /// Pre-fetches on the server, possibly next to the API
  Server,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Public base URL
  #[serde(default = "default_api_url")]
  pub url: String,
  /// Base URL reachable from a server process on the API's host
  #[serde(default = "default_internal_url")]
  pub internal_url: String,
  /// Server-side requests go through `internal_url` when set
  #[serde(default)]
  pub co_located: bool,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_api_url() -> String {
  "http://localhost:8000".to_string()
}

fn default_internal_url() -> String {
  "http://backend:8000".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
      internal_url: default_internal_url(),
      co_located: false,
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Disable to always go to the network
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_stale_secs")]
  pub stale_time_secs: i64,
  /// Stale time for bounding-box (map) queries
  #[serde(default = "default_stale_secs")]
  pub map_stale_time_secs: i64,
}

fn default_true() -> bool {
  true
}

fn default_stale_secs() -> i64 {
  60
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_time_secs: default_stale_secs(),
      map_stale_time_secs: default_stale_secs(),
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    Duration::seconds(self.stale_time_secs)
  }

  pub fn map_stale_time(&self) -> Duration {
    Duration::seconds(self.map_stale_time_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertiesConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
}

fn default_page_size() -> u32 {
  12
}

impl Default for PropertiesConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_level")]
  pub level: String,
  /// Log to this file instead of stderr
  pub file: Option<PathBuf>,
}

fn default_level() -> String {
  "info".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_level(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./propfolio.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/propfolio/config.yaml
  ///
  /// Without any file the built-in defaults are used.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_env(|key| std::env::var(key).ok());

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("propfolio.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("propfolio").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply `BACKEND_API_URL`, `INTERNAL_BACKEND_API_URL` and `IS_DOCKER`.
  fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("BACKEND_API_URL") {
      self.api.url = url;
    }
    if let Some(url) = var("INTERNAL_BACKEND_API_URL") {
      self.api.internal_url = url;
    }
    if let Some(flag) = var("IS_DOCKER") {
      self.api.co_located = matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_defaults_from_empty_file() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.url, "http://localhost:8000");
    assert_eq!(config.properties.page_size, 12);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.stale_time(), Duration::seconds(60));
  }

  #[test]
  fn test_partial_file() {
    let config = Config::parse(
      r#"
api:
  url: https://estates.example.com
cache:
  map_stale_time_secs: 5
logging:
  level: debug
"#,
    )
    .unwrap();

    assert_eq!(config.api.url, "https://estates.example.com");
    assert_eq!(config.api.internal_url, "http://backend:8000");
    assert_eq!(config.cache.stale_time_secs, 60);
    assert_eq!(config.cache.map_stale_time(), Duration::seconds(5));
    assert_eq!(config.logging.level, "debug");
  }

  #[test]
  fn test_env_overrides() {
    let env: HashMap<&str, &str> = [
      ("BACKEND_API_URL", "https://public.example.com"),
      ("INTERNAL_BACKEND_API_URL", "http://api:9000"),
      ("IS_DOCKER", "true"),
    ]
    .into_iter()
    .collect();

    let mut config = Config::default();
    config.apply_env(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.api.url, "https://public.example.com");
    assert_eq!(config.api.internal_url, "http://api:9000");
    assert!(config.api.co_located);
  }
}
