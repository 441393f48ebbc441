//! Configuration management for the wake listener

pub mod file;

use std::net::IpAddr;
use std::path::PathBuf;

use crate::engine::DEFAULT_KEYWORD;
use crate::presence::Notice;
use crate::settings::DEFAULT_NAMESPACE;
use crate::{Error, Result};

use self::file::WakeConfigFile;

/// Default port of the local HTTP bridge
pub const DEFAULT_PORT: u16 = 18791;

/// Wake listener configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to data directory (database)
    pub data_dir: PathBuf,

    /// Preference namespace for the settings store
    pub namespace: String,

    /// Keyword selector handed to the detector engine
    pub keyword: String,

    /// Presence configuration
    pub presence: PresenceConfig,

    /// Command run when a detection brings the host forward
    pub activation_command: Vec<String>,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,
}

/// Presence configuration
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Hold a sleep inhibitor while listening
    pub inhibit_sleep: bool,

    /// Indicator text
    pub notice: Notice,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind
    pub bind: IpAddr,

    /// Port to listen on
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an override is malformed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if the bind address or port is malformed
    pub fn from_sources(fc: WakeConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Data directory (~/.local/share/wake-listener on Linux)
        let data_dir = env("WAKE_LISTENER_DATA_DIR")
            .or(fc.settings.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let namespace = env("WAKE_LISTENER_NAMESPACE")
            .or(fc.settings.namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let keyword = env("WAKE_LISTENER_KEYWORD")
            .or(fc.engine.keyword)
            .unwrap_or_else(|| DEFAULT_KEYWORD.to_string());

        let defaults = Notice::default();
        let presence = PresenceConfig {
            inhibit_sleep: env("WAKE_LISTENER_INHIBIT_SLEEP")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.presence.inhibit_sleep)
                .unwrap_or(true),
            notice: Notice {
                title: fc.presence.notification_title.unwrap_or(defaults.title),
                text: fc.presence.notification_text.unwrap_or(defaults.text),
                action_label: defaults.action_label,
            },
        };

        let port = match env("WAKE_LISTENER_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid WAKE_LISTENER_PORT: {raw}")))?,
            None => fc.api.port.unwrap_or(DEFAULT_PORT),
        };

        let bind = match env("WAKE_LISTENER_BIND").or(fc.api.bind) {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid bind address: {raw}")))?,
            None => ApiServerConfig::default().bind,
        };

        Ok(Self {
            data_dir,
            namespace,
            keyword,
            presence,
            activation_command: fc.activation.command.unwrap_or_default(),
            api_server: ApiServerConfig { bind, port },
        })
    }

    /// Path of the settings database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("wake-listener.db")
    }
}

fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".wake-listener"),
        |d| d.data_dir().join("wake-listener"),
    )
}
