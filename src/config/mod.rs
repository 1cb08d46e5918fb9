//! Configuration management for reelsync.
//!
//! Configuration is read from `~/.config/reelsync/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pagination::DEFAULT_PAGE_CAP;

/// Environment variable that overrides `api.api_key`.
pub const API_KEY_ENV: &str = "TMDB_API_KEY";

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub pagination: PaginationConfig,
}

/// Remote API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Versioned API root (default: https://api.themoviedb.org/3)
    pub base_url: String,

    /// v3 API key, sent as the `api_key` query parameter
    pub api_key: Option<String>,

    /// v4 read access token, sent as a bearer header
    pub bearer_token: Option<String>,

    /// Per-call timeout in seconds (default: 10)
    pub timeout_secs: u64,

    /// Retries for network failures, rate limiting and timeouts (default: 0)
    pub max_retries: u32,

    /// Base delay between retries in milliseconds, multiplied by the attempt
    pub retry_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: None,
            bearer_token: None,
            timeout_secs: 10,
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Upper bound for one logical request: every attempt timing out plus
    /// the linear backoff between them.
    pub fn request_budget(&self) -> Duration {
        let attempts = self.max_retries.saturating_add(1);
        let backoff_steps = self.max_retries.saturating_mul(attempts) / 2;
        self.timeout() * attempts + self.retry_backoff() * backoff_steps
    }
}

/// Request-token approval step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Page the user visits to approve a request token
    pub approval_url: String,

    /// Where the approval page sends the user afterwards
    pub redirect_url: Option<String>,

    /// Open the approval page in the default browser on `login`
    pub open_browser: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            approval_url: "https://www.themoviedb.org/authenticate".to_string(),
            redirect_url: None,
            open_browser: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Highest page number ever offered, whatever the API reports
    pub page_cap: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_cap: DEFAULT_PAGE_CAP,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
                path: config_path.to_path_buf(),
                source: e,
            })?;

            toml::from_str::<Config>(&content).map_err(|e| ConfigError::Parse {
                path: config_path.to_path_buf(),
                source: e,
            })?
        } else {
            Self::create_default_config(config_path)?;
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                config.api.api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Get the default config file path: `~/.config/reelsync/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("reelsync").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# reelsync configuration

[api]
base_url = "https://api.themoviedb.org/3"

# v3 API key. The TMDB_API_KEY environment variable takes precedence.
# api_key = ""

# Optional v4 read access token, sent as "Authorization: Bearer ..."
# bearer_token = ""

# Every remote call fails with Timeout after this many seconds
timeout_secs = 10

# Retries for network failures, 429s and timeouts (0 disables retrying)
max_retries = 0
retry_backoff_ms = 500

[auth]
approval_url = "https://www.themoviedb.org/authenticate"
# redirect_url = "http://localhost:3000/approved"
open_browser = true

[pagination]
# The API reports more pages than it serves; never offer pages past this
page_cap = 500
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config.api.base_url, "https://api.themoviedb.org/3");
        assert_eq!(config.api.timeout(), Duration::from_secs(10));
        assert_eq!(config.api.max_retries, 0);
        assert_eq!(config.pagination.page_cap, 500);
        assert!(config.auth.open_browser);
    }

    #[test]
    fn test_request_budget_covers_retries() {
        let api = ApiConfig {
            timeout_secs: 2,
            max_retries: 2,
            retry_backoff_ms: 100,
            ..Default::default()
        };
        // 3 attempts of 2s plus 100ms and 200ms of backoff
        assert_eq!(api.request_budget(), Duration::from_millis(6300));

        assert_eq!(ApiConfig::default().request_budget(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[api]
timeout_secs = 3
max_retries = 2
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.api.timeout(), Duration::from_secs(3));
        assert_eq!(config.api.max_retries, 2);
        assert_eq!(config.api.retry_backoff(), Duration::from_millis(500));
        assert_eq!(config.pagination.page_cap, DEFAULT_PAGE_CAP);
    }

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").expect("Empty config should work");
        assert_eq!(config.api.api_key, None);
        assert_eq!(
            config.auth.approval_url,
            "https://www.themoviedb.org/authenticate"
        );
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.pagination.page_cap, 500);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.api.base_url, config.api.base_url);
    }

    #[test]
    fn test_load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api\nbase_url = ").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
