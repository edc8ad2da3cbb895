//! Tool settings for the wgsync binary.
//!
//! Settings are loaded from a TOML file found by trying, in order: the
//! `--config` flag, the `WGSYNC_CONFIG` environment variable, the
//! per-user configuration directory, and finally `/etc/wgsync`. A missing
//! file in the search path is fine and yields the defaults; a file named
//! explicitly must exist.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use wgsync_ipc::{DEFAULT_SOCKET_DIR, DEFAULT_TIMEOUT};

/// Environment variable naming the settings file.
pub const ENV_CONFIG: &str = "WGSYNC_CONFIG";

/// System-wide settings path, the last resort in the search order.
const ETC_CONFIG: &str = "/etc/wgsync/config.toml";

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// An explicitly named settings file does not exist.
    #[error("settings file not found at {0}")]
    NotFound(PathBuf),

    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file is not valid TOML for this schema.
    #[error("failed to parse settings file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but makes no sense.
    #[error("invalid value for {key}: {message}")]
    Invalid {
        key: &'static str,
        message: String,
    },
}

/// Control-channel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlSettings {
    /// Directory holding per-interface control sockets.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,

    /// Per-operation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SOCKET_DIR)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for ControlSettings {
    fn default() -> Self {
        ControlSettings {
            socket_dir: default_socket_dir(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Directory for rolling log files; stderr-only when unset.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Base filename for rolling log files.
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
}

fn default_log_file_name() -> String {
    "wgsync.log".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            directory: None,
            file_name: default_log_file_name(),
        }
    }
}

/// Main settings structure for the wgsync binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Log level (default: "info"), unless overridden on the command
    /// line.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Control-channel settings.
    #[serde(default)]
    pub control: ControlSettings,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: default_log_level(),
            control: ControlSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Resolves the search order and loads the first settings file found,
    /// falling back to defaults when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = env::var_os(ENV_CONFIG) {
            return Self::from_file(Path::new(&path));
        }
        for path in Self::search_paths() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Settings::default())
    }

    /// The implicit search locations, in order.
    fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("wgsync").join("config.toml"));
        }
        paths.push(PathBuf::from(ETC_CONFIG));
        paths
    }

    /// Loads and validates settings from a specific file.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| SettingsError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the loaded values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.control.timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "control.timeout_secs",
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.control.socket_dir.as_os_str().is_empty() {
            return Err(SettingsError::Invalid {
                key: "control.socket_dir",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
