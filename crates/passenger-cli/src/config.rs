//! Client configuration stored in `config.toml`.
//!
//! Location:
//! - Linux/macOS: `$XDG_CONFIG_HOME/passenger/config.toml`, falling back to
//!   `~/.config/passenger/config.toml`
//! - Windows: `%APPDATA%\passenger\config.toml`
//!
//! `PASSENGER_SERVER_URL` in the environment (or a `.env` file) overrides
//! the saved server URL.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Environment variable that overrides [`Config::server_url`].
pub const SERVER_URL_ENV: &str = "PASSENGER_SERVER_URL";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Persisted client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the Passenger server is hosted, without the `/api` path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    /// Request timeout for API calls, in seconds.
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from the default location, applying the environment override.
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = default_path()?;
        let mut config = Self::load_from(&path)?;
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!("server URL taken from {SERVER_URL_ENV}");
                config.server_url = Some(url);
            }
        }
        Ok(config)
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Save to `path`, creating the parent directory owner-only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))?;
            }
        }

        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %path.display(), "saved config");
        Ok(())
    }

    /// API base URL derived from [`server_url`](Self::server_url).
    pub fn api_base(&self) -> Result<String> {
        match self.server_url.as_deref() {
            Some(url) if !url.trim().is_empty() => api_base_url(url),
            _ => bail!("server URL not configured, use `passenger server <url>` to set it"),
        }
    }
}

/// Normalize a user-supplied server URL into the API base: trailing slashes
/// and a trailing `/api` are dropped, then `/api` is appended.
pub fn api_base_url(server_url: &str) -> Result<String> {
    let trimmed = server_url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);

    let parsed = url::Url::parse(trimmed).with_context(|| format!("invalid server URL: {server_url}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        bail!("server URL must use http or https, got {}", parsed.scheme());
    }

    Ok(format!("{trimmed}/api"))
}

/// `config.toml` under the platform config directory.
pub fn default_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("passenger").join("config.toml"))
}

fn config_dir() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").context("APPDATA is not set")?;
        Ok(PathBuf::from(appdata))
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                return Ok(PathBuf::from(xdg));
            }
        }
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_normalization() {
        assert_eq!(api_base_url("https://pass.example.com").unwrap(), "https://pass.example.com/api");
        assert_eq!(api_base_url("https://pass.example.com/").unwrap(), "https://pass.example.com/api");
        assert_eq!(api_base_url("https://pass.example.com/api").unwrap(), "https://pass.example.com/api");
        assert_eq!(api_base_url("https://pass.example.com/api/").unwrap(), "https://pass.example.com/api");
        assert_eq!(api_base_url("http://localhost:8080/x").unwrap(), "http://localhost:8080/x/api");
    }

    #[test]
    fn api_base_rejects_bad_urls() {
        assert!(api_base_url("not a url").is_err());
        assert!(api_base_url("ftp://pass.example.com").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.api_base().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("passenger").join("config.toml");

        let config = Config {
            server_url: Some("https://pass.example.com".into()),
            timeout_secs: 10,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.api_base().unwrap(), "https://pass.example.com/api");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"http://localhost:3000\"\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(loaded.server_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = [").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
