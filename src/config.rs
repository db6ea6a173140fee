//! Configuration module for twinpipe.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::channel::ChannelKind;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "twinpipe")]
#[command(author = "twinpipe authors")]
#[command(version = "0.1.0")]
#[command(about = "Local request/response server over string and number channels", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the channel sockets
    #[arg(short = 'd', long, global = true)]
    pub socket_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// What to run.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve both channels until interrupted
    Serve {
        /// Worker threads kept available for connection handlers
        #[arg(long)]
        min_workers: Option<usize>,

        /// Maximum number of connections handled at once
        #[arg(long)]
        max_workers: Option<usize>,

        /// Deadline for one request/response exchange, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Send requests to a channel
    Send {
        /// Channel to use: S, N, string-channel or number-channel
        #[arg(short = 'C', long)]
        channel: ChannelKind,

        /// Number of concurrent sessions to launch
        #[arg(short = 'n', long, default_value_t = 1)]
        sessions: usize,

        /// Response deadline, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Request text (defaults to a per-session label)
        message: Option<String>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))
    }
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Directory holding the channel sockets
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
    /// Worker threads kept available for handlers
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    /// Maximum concurrent handlers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Deadline for one exchange, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Time allowed for in-flight handlers at shutdown, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Longest accepted request line in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            timeout_ms: default_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Response deadline, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_socket_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_min_workers() -> usize {
    20
}

fn default_max_workers() -> usize {
    100
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_max_line_length() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Server settings after merging CLI and file values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeSettings {
    pub min_workers: usize,
    pub max_workers: usize,
    pub timeout: Duration,
    pub shutdown_grace: Duration,
    pub max_line_length: usize,
}

/// Client settings after merging CLI and file values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSettings {
    pub channel: ChannelKind,
    pub sessions: usize,
    pub timeout: Duration,
    pub message: Option<String>,
}

/// Resolved mode of operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Serve(ServeSettings),
    Send(SendSettings),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub socket_dir: PathBuf,
    pub log_level: String,
    pub mode: Mode,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = match cli.config {
            Some(ref config_path) => TomlConfig::from_file(config_path)?,
            None => TomlConfig::default(),
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let mode = match cli.command {
            Command::Serve {
                min_workers,
                max_workers,
                timeout_ms,
            } => {
                let min_workers = min_workers.unwrap_or(toml_config.server.min_workers);
                let max_workers = max_workers.unwrap_or(toml_config.server.max_workers);
                if min_workers == 0 || min_workers > max_workers {
                    return Err(ConfigError::Invalid(format!(
                        "worker bounds must satisfy 1 <= min <= max (got min {min_workers}, max {max_workers})"
                    )));
                }
                let timeout_ms = timeout_ms.unwrap_or(toml_config.server.timeout_ms);
                if timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "timeout_ms must be positive".to_string(),
                    ));
                }
                if toml_config.server.max_line_length == 0 {
                    return Err(ConfigError::Invalid(
                        "max_line_length must be positive".to_string(),
                    ));
                }

                Mode::Serve(ServeSettings {
                    min_workers,
                    max_workers,
                    timeout: Duration::from_millis(timeout_ms),
                    shutdown_grace: Duration::from_millis(toml_config.server.shutdown_grace_ms),
                    max_line_length: toml_config.server.max_line_length,
                })
            }
            Command::Send {
                channel,
                sessions,
                timeout_ms,
                message,
            } => {
                if sessions == 0 {
                    return Err(ConfigError::Invalid(
                        "number of sessions must be positive".to_string(),
                    ));
                }
                let timeout_ms = timeout_ms.unwrap_or(toml_config.client.timeout_ms);
                if timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "timeout_ms must be positive".to_string(),
                    ));
                }

                Mode::Send(SendSettings {
                    channel,
                    sessions,
                    timeout: Duration::from_millis(timeout_ms),
                    message,
                })
            }
        };

        Ok(Config {
            socket_dir: cli.socket_dir.unwrap_or(toml_config.server.socket_dir),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
            mode,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
