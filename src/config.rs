//! Runtime configuration loaded from an optional TOML file.
//!
//! Every field has a default, so an empty or missing file yields a working
//! local setup: store in `peers.json`, tracker on `127.0.0.1:8000`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "mini-tracker.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file holding peer records, shared by `harvest` and `serve`.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("peers.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Announce URL written into rewritten torrents.
    pub announce_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            announce_url: "http://localhost:8000/announce".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub torrents_dir: PathBuf,
    pub modified_dir: PathBuf,
    /// Port reported to trackers in announce requests.
    pub port: u16,
    /// Upper bound for each tracker request, connect to last body byte.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            torrents_dir: PathBuf::from("torrents"),
            modified_dir: PathBuf::from("modified"),
            port: 6881,
            timeout_secs: 10,
            user_agent: concat!("mini-tracker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Loads `path`, or `DEFAULT_CONFIG_PATH` when none is given.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.client.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "client.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if url::Url::parse(&self.server.announce_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.announce_url is not a URL: {}",
                self.server.announce_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.bind.port(), 8000);
        assert_eq!(config.client.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            announce_url = "http://tracker.lan:9000/announce"

            [client]
            timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.server.announce_url, "http://tracker.lan:9000/announce");
        assert_eq!(config.server.bind, ServerConfig::default().bind);
        assert_eq!(config.client.timeout_secs, 3);
        assert_eq!(config.client.port, 6881);
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load(Some(missing.as_path())),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();

        let zero_timeout = dir.path().join("zero.toml");
        std::fs::write(&zero_timeout, "[client]\ntimeout_secs = 0\n").unwrap();
        assert!(matches!(
            Config::load(Some(zero_timeout.as_path())),
            Err(ConfigError::Invalid(_))
        ));

        let bad_toml = dir.path().join("bad.toml");
        std::fs::write(&bad_toml, "[client\n").unwrap();
        assert!(matches!(
            Config::load(Some(bad_toml.as_path())),
            Err(ConfigError::Parse { .. })
        ));
    }
}
