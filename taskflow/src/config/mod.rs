//! Client settings.
//!
//! A setting is taken from the first source that has it: command-line flag
//! (or the environment variable clap reads for it), then the
//! `[remote]`/`[sync]`/`[storage]` tables of `~/.config/taskflow/config.toml`,
//! then the built-in value. The default file may be absent; a file passed
//! with `--config` may not.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::relay::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::sync::DEFAULT_WRITE_TIMEOUT;

/// Why the client settings could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read, or was named and is
    /// missing.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// I/O failure.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this config.
    #[error("cannot parse {path}: {source}")]
    ParseToml {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SettingsFile {
    remote: RemoteTable,
    sync: SyncTable,
    storage: StorageTable,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemoteTable {
    relay_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncTable {
    write_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageTable {
    data_dir: Option<PathBuf>,
}

/// Client settings after every source has been applied.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay server WebSocket URL. Without one, signed-in boards use the
    /// in-process backends.
    pub relay_url: Option<String>,
    /// How long the WebSocket handshake with the relay may take.
    pub connect_timeout: Duration,
    /// Timeout for a single relay request.
    pub request_timeout: Duration,
    /// Time a remote write may take before the local fallback applies.
    pub write_timeout: Duration,
    /// Directory holding the guest board record.
    pub data_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            data_dir: default_data_dir(),
        }
    }
}

impl ClientConfig {
    /// Read the settings file and apply the flags over it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a file passed with `--config` is missing,
    /// or when any settings file is unreadable or malformed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => read_config_file(path, true)?,
            None => default_config_path()
                .map(|path| read_config_file(&path, false))
                .transpose()?
                .unwrap_or_default(),
        };
        Ok(Self::resolve(cli, &file))
    }

    fn resolve(cli: &CliArgs, file: &SettingsFile) -> Self {
        let builtin = Self::default();
        Self {
            relay_url: cli
                .relay_url
                .clone()
                .or_else(|| file.remote.relay_url.clone())
                .filter(|url| !url.trim().is_empty()),
            connect_timeout: file
                .remote
                .connect_timeout_secs
                .map_or(builtin.connect_timeout, Duration::from_secs),
            request_timeout: file
                .remote
                .request_timeout_secs
                .map_or(builtin.request_timeout, Duration::from_secs),
            write_timeout: cli
                .write_timeout_secs
                .or(file.sync.write_timeout_secs)
                .map_or(builtin.write_timeout, Duration::from_secs),
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone())
                .unwrap_or(builtin.data_dir),
        }
    }
}

/// Command-line flags of the `taskflow` binary.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban task board with local and live-synced storage")]
pub struct CliArgs {
    /// WebSocket URL of the relay server (e.g. `ws://127.0.0.1:9100/ws`).
    #[arg(long, env = "TASKFLOW_RELAY_URL")]
    pub relay_url: Option<String>,

    /// Settings file to use instead of `~/.config/taskflow/config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the guest board record.
    #[arg(long, env = "TASKFLOW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seconds a remote write may take before the local fallback applies.
    #[arg(long)]
    pub write_timeout_secs: Option<u64>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "TASKFLOW_LOG")]
    pub log_level: String,

    /// File the log is appended to instead of `$TMPDIR/taskflow.log`.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from(".taskflow"), |dir| dir.join("taskflow"))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskflow").join("config.toml"))
}

/// Parse a settings file. An absent file is empty unless `required`.
fn read_config_file(path: &Path, required: bool) -> Result<SettingsFile, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(SettingsFile::default());
        }
        Err(source) => {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    toml::from_str(&contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}
