//! TOML configuration file loading
//!
//! Supports `~/.config/wake-listener/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct WakeConfigFile {
    /// Preference storage
    #[serde(default)]
    pub settings: SettingsFileConfig,

    /// Detector engine
    #[serde(default)]
    pub engine: EngineFileConfig,

    /// Presence resources
    #[serde(default)]
    pub presence: PresenceFileConfig,

    /// Host activation on detection
    #[serde(default)]
    pub activation: ActivationFileConfig,

    /// Local HTTP bridge
    #[serde(default)]
    pub api: ApiFileConfig,
}

/// Preference storage configuration
#[derive(Debug, Default, Deserialize)]
pub struct SettingsFileConfig {
    /// Preference namespace (e.g. "`jarvis_prefs`")
    pub namespace: Option<String>,

    /// Override for the data directory holding the database
    pub data_dir: Option<String>,
}

/// Detector engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct EngineFileConfig {
    /// Keyword selector (e.g. "jarvis")
    pub keyword: Option<String>,
}

/// Presence configuration
#[derive(Debug, Default, Deserialize)]
pub struct PresenceFileConfig {
    /// Hold a sleep inhibitor while listening
    pub inhibit_sleep: Option<bool>,

    /// Indicator title
    pub notification_title: Option<String>,

    /// Indicator body
    pub notification_text: Option<String>,
}

/// Host activation configuration
#[derive(Debug, Default, Deserialize)]
pub struct ActivationFileConfig {
    /// Command (argv) run when a detection brings the host forward
    pub command: Option<Vec<String>>,
}

/// HTTP bridge configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Bind address
    pub bind: Option<String>,

    /// Port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `WakeConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> WakeConfigFile {
    config_file_path().map_or_else(WakeConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_from(path: &Path) -> WakeConfigFile {
    if !path.exists() {
        return WakeConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                WakeConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            WakeConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/wake-listener/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("wake-listener").join("config.toml"))
}
