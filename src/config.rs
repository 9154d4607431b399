use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `backend.url`.
pub const API_URL_ENV: &str = "FLU_RADAR_API_URL";

/// Upper bound on polling periods and timeouts (one week)
pub const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub backend: BackendConfig,
  pub public: PublicConfig,
  pub polling: PollingConfig,
  pub cache: CacheConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
  pub url: String,
  /// Upper bound on every backend request
  pub timeout_secs: u64,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      url: "http://localhost:8000".to_string(),
      timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublicConfig {
  pub disease_url: String,
  pub weather_url: String,
  pub country: String,
  pub city: String,
  pub history_days: u32,
}

impl Default for PublicConfig {
  fn default() -> Self {
    Self {
      disease_url: "https://disease.sh/v3/covid-19".to_string(),
      weather_url: "https://wttr.in".to_string(),
      country: "India".to_string(),
      city: "Mumbai".to_string(),
      history_days: 7,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
  /// Refresh period for backend resources
  pub dashboard_secs: u64,
  /// Refresh period for disease.sh and weather
  pub public_secs: u64,
  /// Delay between simulated feed transactions
  pub feed_secs: u64,
}

impl Default for PollingConfig {
  fn default() -> Self {
    Self {
      dashboard_secs: 30,
      public_secs: 60,
      feed_secs: 15,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Keep the last good value of each resource on disk
  pub persist: bool,
  /// Database location (defaults to $XDG_DATA_HOME/flu-radar/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      persist: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Write logs to a daily rolling file instead of stderr
  pub file: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./flu-radar.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/flu-radar/config.yaml
  ///
  /// Without any file the defaults are used. `FLU_RADAR_API_URL` overrides
  /// the backend url either way.
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
      None => Self::default(),
    };

    if let Ok(url) = std::env::var(API_URL_ENV) {
      config.backend.url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("flu-radar.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("flu-radar").join("config.yaml");
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
    // An empty file deserializes to null, which means "all defaults".
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Reject settings the poller cannot run with.
  pub fn validate(&self) -> Result<()> {
    let periods = [
      ("polling.dashboard_secs", self.polling.dashboard_secs),
      ("polling.public_secs", self.polling.public_secs),
      ("polling.feed_secs", self.polling.feed_secs),
      ("backend.timeout_secs", self.backend.timeout_secs),
    ];
    for (name, value) in periods {
      if value == 0 {
        return Err(eyre!("{} must be greater than zero", name));
      }
      if value > MAX_PERIOD_SECS {
        return Err(eyre!(
          "{} must be at most {} seconds, got {}",
          name,
          MAX_PERIOD_SECS,
          value
        ));
      }
    }
    if self.public.history_days == 0 {
      return Err(eyre!("public.history_days must be greater than zero"));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::from_yaml("").unwrap();
    assert_eq!(config.backend.url, "http://localhost:8000");
    assert_eq!(config.backend.timeout_secs, 10);
    assert_eq!(config.polling.dashboard_secs, 30);
    assert_eq!(config.polling.public_secs, 60);
    assert!(config.cache.persist);
  }

  #[test]
  fn test_partial_config_keeps_other_defaults() {
    let config = Config::from_yaml(
      r#"
backend:
  url: http://radar.internal:9000
public:
  city: Pune
cache:
  persist: false
"#,
    )
    .unwrap();
    assert_eq!(config.backend.url, "http://radar.internal:9000");
    assert_eq!(config.backend.timeout_secs, 10);
    assert_eq!(config.public.city, "Pune");
    assert_eq!(config.public.country, "India");
    assert!(!config.cache.persist);
  }

  #[test]
  fn test_invalid_yaml_is_error() {
    assert!(Config::from_yaml("backend: [1, 2").is_err());
  }

  #[test]
  fn test_zero_interval_rejected() {
    let config = Config::from_yaml("polling:\n  dashboard_secs: 0\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("polling.dashboard_secs"));
  }

  #[test]
  fn test_huge_interval_rejected() {
    let config = Config::from_yaml("polling:\n  public_secs: 18446744073709551615\n").unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("polling.public_secs must be at most"));

    let config = Config::from_yaml(&format!("backend:\n  timeout_secs: {}\n", MAX_PERIOD_SECS)).unwrap();
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/flu-radar.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
