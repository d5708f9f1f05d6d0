use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::network;
use crate::worker::{CacheSettings, DEFAULT_SWEEP_CONCURRENCY};

/// Environment variable that overrides `cache.version` at deploy time.
pub const VERSION_ENV: &str = "PANTRY_CACHE_VERSION";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Site origin that seed paths and fetched paths are resolved against
  pub origin: String,
  pub cache: CacheConfig,
  pub worker: WorkerConfig,
  pub page: PageConfig,
  /// Cache database path (defaults to $XDG_DATA_HOME/pantry/cache.db)
  pub database: Option<PathBuf>,
  /// Per-request network timeout in seconds
  pub request_timeout_secs: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://127.0.0.1:5000".to_string(),
      cache: CacheConfig::default(),
      worker: WorkerConfig::default(),
      page: PageConfig::default(),
      database: None,
      request_timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Bucket name prefix; the bucket is `{prefix}-{version}`
  pub prefix: String,
  /// Version tag. Bump it to invalidate every cached entry.
  pub version: String,
  /// Paths stored at install time
  pub seed: Vec<String>,
  /// Server-rendered routes that must never be seeded
  pub dynamic_prefixes: Vec<String>,
  pub sweep_concurrency: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "lovers-space".to_string(),
      version: "v1".to_string(),
      seed: vec!["/".to_string(), "/static/manifest.json".to_string()],
      dynamic_prefixes: ["/recipe", "/recipes", "/add_recipe", "/what_can_i_make"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Where the page loads the worker script from
  pub script: String,
  /// Registration scope
  pub scope: String,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      script: "/static/sw.js".to_string(),
      scope: "/".to_string(),
    }
  }
}

/// Values for the PWA head tags rendered by `pantry snippet`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageConfig {
  pub manifest: String,
  pub icon: String,
  pub app_title: String,
  pub theme_color: String,
  pub status_bar_style: String,
}

impl Default for PageConfig {
  fn default() -> Self {
    Self {
      manifest: "/static/manifest.json".to_string(),
      icon: "/static/icon.png".to_string(),
      app_title: "Our Kitchen".to_string(),
      theme_color: "#f43f5e".to_string(),
      status_bar_style: "black-translucent".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file, then apply the version override from the environment.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pantry.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pantry/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        debug!("No configuration file found, using defaults");
        Self::default()
      }
    };

    config.with_cache_version(std::env::var(VERSION_ENV).ok())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pantry.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pantry").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  /// Replace the version tag when an override is given.
  pub fn with_cache_version(mut self, version: Option<String>) -> Result<Self> {
    if let Some(version) = version {
      self.cache.version = version.trim().to_string();
    }
    self.validate()?;
    Ok(self)
  }

  fn validate(&self) -> Result<()> {
    if self.cache.prefix.trim().is_empty() {
      return Err(eyre!("cache.prefix must not be empty"));
    }
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }
    Ok(())
  }

  /// Name of the current cache bucket.
  pub fn cache_name(&self) -> String {
    format!("{}-{}", self.cache.prefix, self.cache.version)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }

  /// Database path, falling back to the per-user data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Ok(crate::cache::SqliteStorage::default_path()?),
    }
  }

  /// Seed entries that point at server-rendered routes.
  pub fn dynamic_seed_entries(&self) -> Vec<&str> {
    self
      .cache
      .seed
      .iter()
      .map(String::as_str)
      .filter(|seed| {
        let path = seed.split(['?', '#']).next().unwrap_or_default();
        self
          .cache
          .dynamic_prefixes
          .iter()
          .any(|prefix| path == prefix.as_str() || path.starts_with(&format!("{}/", prefix)))
      })
      .collect()
  }

  /// Interceptor settings with seed paths resolved against the origin.
  pub fn cache_settings(&self) -> Result<CacheSettings> {
    for seed in self.dynamic_seed_entries() {
      warn!(
        seed,
        "Seeding a server-rendered page; updates to it stay invisible until the cache version is bumped"
      );
    }

    let origin = self.origin_url()?;
    let seed = self
      .cache
      .seed
      .iter()
      .map(|path| network::resolve(&origin, path))
      .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(CacheSettings {
      sweep_concurrency: self.cache.sweep_concurrency,
      ..CacheSettings::new(self.cache_name(), seed)
    })
  }
}
