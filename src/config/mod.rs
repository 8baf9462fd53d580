//! Configuration and storage locations

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_JOIN_URL: &str = "https://app.zoom.us/wc/{meeting}/join?pwd={passcode}&un={name}";

/// Application configuration (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSettings,
    pub realtime: RealtimeSettings,
    pub identity: IdentitySettings,
    pub live: LiveSettings,
}

/// Backend REST endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Socket.IO broker. Empty means "same host as the API".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub url: Option<String>,
}

/// Hosted identity provider (Firebase-compatible REST API).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// Web API key of the identity project.
    pub api_key: String,
    /// Google OAuth client used for the device sign-in flow.
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
}

/// Live video session launcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveSettings {
    /// Join URL with `{meeting}`, `{passcode}` and `{name}` placeholders.
    pub join_url_template: String,
    /// Program that opens the join URL.
    pub launcher: String,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            join_url_template: DEFAULT_JOIN_URL.to_string(),
            launcher: if cfg!(target_os = "macos") {
                "open".to_string()
            } else {
                "xdg-open".to_string()
            },
        }
    }
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "mentor-chat", "mentor-chat")
            .context("Could not determine config directory")
    }

    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().to_path_buf())
    }

    /// Directory for logs and other runtime data.
    pub fn data_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Session file path
    pub fn session_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("session.toml"))
    }

    /// Load configuration from disk, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file; missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("MENTOR_CHAT_API_URL") {
            self.api.base_url = url;
        }
        if let Some(url) = var("MENTOR_CHAT_SOCKET_URL") {
            self.realtime.url = Some(url);
        }
        if let Some(key) = var("MENTOR_CHAT_IDENTITY_KEY") {
            self.identity.api_key = key;
        }
    }

    /// Effective Socket.IO broker URL.
    pub fn socket_url(&self) -> &str {
        self.realtime
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(self.api.base_url.as_str())
    }
}

/// Print the effective configuration.
pub fn show() -> Result<()> {
    let path = Config::config_path()?;
    let config = Config::load()?;

    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("  (not present, using defaults)");
    }
    println!();
    println!("API:        {}", config.api.base_url);
    println!("Realtime:   {}", config.socket_url());
    println!(
        "Identity:   {}",
        if config.identity.api_key.is_empty() {
            "(no API key)"
        } else {
            "API key set"
        }
    );
    println!(
        "Google:     {}",
        config
            .identity
            .google_client_id
            .as_deref()
            .unwrap_or("(not configured)")
    );
    println!("Live URL:   {}", config.live.join_url_template);
    println!("Launcher:   {}", config.live.launcher);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.socket_url(), DEFAULT_API_URL);
    }

    #[test]
    fn test_partial_file_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[api]\nbase_url = \"https://api.example.com\"\n\n[identity]\napi_key = \"k\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.identity.api_key, "k");
        assert_eq!(config.live, LiveSettings::default());
        assert_eq!(config.socket_url(), "https://api.example.com");

        let copy = dir.path().join("nested/copy.toml");
        config.save_to(&copy).unwrap();
        assert_eq!(Config::load_from(&copy).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "MENTOR_CHAT_SOCKET_URL" => Some("https://rt.example.com".to_string()),
            "MENTOR_CHAT_IDENTITY_KEY" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.socket_url(), "https://rt.example.com");
        assert_eq!(config.identity.api_key, "secret");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[api\nbase_url = 1").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
