//! Relay server configuration.
//!
//! Values come from, highest priority first: CLI flags (and their `env`
//! fallbacks), the `[server]` table of the TOML config file, and compiled
//! defaults. The default file lives at
//! `~/.config/taskflow-relay/config.toml` and may be absent; a file named
//! with `--config` must exist.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9100";

/// Errors that can occur when loading relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this config.
    #[error("failed to parse config file {path}: {source}")]
    ParseToml {
        /// Path of the offending file.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },

    /// The bind address is not `host:port`.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddr(String),
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RelayConfigFile {
    server: ServerSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    bind_addr: Option<String>,
    max_payload_size: Option<usize>,
    max_feeds_per_connection: Option<usize>,
}

/// CLI arguments for the relay server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Task Flow relay server")]
pub struct RelayCliArgs {
    /// Address to listen on, `host:port`.
    #[arg(short, long, env = "TASKFLOW_RELAY_ADDR")]
    pub bind: Option<String>,

    /// Config file to read instead of `~/.config/taskflow-relay/config.toml`.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Largest frame accepted from a client, in bytes.
    #[arg(long)]
    pub max_payload_size: Option<usize>,

    /// Live feeds one connection may hold open at once.
    #[arg(long)]
    pub max_feeds_per_connection: Option<usize>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info", env = "TASKFLOW_RELAY_LOG")]
    pub log_level: String,
}

/// Resolved relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address.
    pub bind_addr: SocketAddr,
    /// Largest frame accepted from a client, in bytes.
    pub max_payload_size: usize,
    /// Live feeds one connection may hold open at once.
    pub max_feeds_per_connection: usize,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9100)),
            max_payload_size: 256 * 1024,
            max_feeds_per_connection: 16,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Read the config file (if any) and merge it under the CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file that must exist is missing, a file
    /// cannot be parsed, or the bind address is malformed.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => read_config_file(path, true)?,
            None => default_config_path()
                .map(|path| read_config_file(&path, false))
                .transpose()?
                .unwrap_or_default(),
        };
        Self::resolve(cli, file)
    }

    fn resolve(cli: &RelayCliArgs, file: RelayConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let server = file.server;

        let bind_addr = match cli.bind.clone().or(server.bind_addr) {
            Some(addr) => addr.parse().map_err(|_| ConfigError::InvalidBindAddr(addr))?,
            None => defaults.bind_addr,
        };

        Ok(Self {
            bind_addr,
            max_payload_size: cli
                .max_payload_size
                .or(server.max_payload_size)
                .unwrap_or(defaults.max_payload_size),
            max_feeds_per_connection: cli
                .max_feeds_per_connection
                .or(server.max_feeds_per_connection)
                .unwrap_or(defaults.max_feeds_per_connection),
            log_level: cli.log_level.clone(),
        })
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("taskflow-relay").join("config.toml"))
}

/// Parse a config file. A missing file is empty config unless `required`.
fn read_config_file(path: &Path, required: bool) -> Result<RelayConfigFile, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RelayConfigFile::default());
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
