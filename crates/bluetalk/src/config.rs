//! Application configuration.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. a TOML file: `$BLUETALK_CONFIG` if set, else
//!    `~/.config/bluetalk/config.toml` if it exists
//! 3. environment overrides: `BLUETALK_NICK`, `BLUETALK_WIFI_PORT`,
//!    `BLUETALK_SERVICE_UUID`
//!
//! ```toml
//! nickname = "alice"
//! log_filter = "bluetalk=debug"
//!
//! [bluetooth]
//! service_uuid = "6f6a0b2c-5c7a-4d21-9c7f-0f2a4a4c1a10"
//! service_name = "BlueTalk"
//!
//! [wifi_direct]
//! port = 8988
//! ```

use std::path::{Path, PathBuf};

use bluetalk_session::CredentialStore;
use bluetalk_transport::{BluetoothConfig, WifiDirectConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "BLUETALK_CONFIG";

/// Errors while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`Config`].
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An override variable holds a value of the wrong shape.
    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Everything a BlueTalk process needs to start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Nickname attached to outgoing lines. Empty sends bare lines.
    pub nickname: String,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub bluetooth: BluetoothConfig,
    pub wifi_direct: WifiDirectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            log_filter: "info".to_string(),
            bluetooth: BluetoothConfig::default(),
            wifi_direct: WifiDirectConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default file locations and the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let var = |name: &str| std::env::var(name).ok();
        let file = match var(CONFIG_ENV) {
            Some(path) => Some(PathBuf::from(path)),
            None => default_path().filter(|p| p.exists()),
        };
        Self::load_with(file.as_deref(), var)
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Loads from `file` (if any), then applies overrides looked up
    /// through `var`.
    pub fn load_with(
        file: Option<&Path>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        if let Some(nick) = var("BLUETALK_NICK") {
            config.nickname = nick;
        }
        if let Some(value) = var("BLUETALK_WIFI_PORT") {
            config.wifi_direct.port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "BLUETALK_WIFI_PORT",
                value,
            })?;
        }
        if let Some(value) = var("BLUETALK_SERVICE_UUID") {
            config.bluetooth.service_uuid =
                Uuid::parse_str(&value).map_err(|_| ConfigError::InvalidEnv {
                    name: "BLUETALK_SERVICE_UUID",
                    value,
                })?;
        }
        Ok(config)
    }
}

/// The configured nickname doubles as the credential store for
/// [`SessionManager::send_as`](bluetalk_session::SessionManager::send_as).
impl CredentialStore for Config {
    fn nickname(&self) -> Option<String> {
        self.nickname.nickname()
    }
}

fn default_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config/bluetalk/config.toml"))
}
