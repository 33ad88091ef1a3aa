//! Configuration module for the task server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocol::ReplyMode;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the task server
#[derive(Parser, Debug)]
#[command(name = "task-server")]
#[command(author = "task-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A task-assignment server over UDP and TCP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// UDP address to bind to (e.g., 127.0.0.1:1234)
    #[arg(short = 'u', long)]
    pub udp_listen: Option<String>,

    /// TCP address to bind to (e.g., 127.0.0.1:1301)
    #[arg(short = 't', long)]
    pub tcp_listen: Option<String>,

    /// UDP address for the uppercase echo service (disabled when unset)
    #[arg(short = 'e', long)]
    pub echo_listen: Option<String>,

    /// Largest datagram payload accepted, longer payloads are truncated
    #[arg(long)]
    pub max_datagram_size: Option<usize>,

    /// Largest stream command accepted before the connection is dropped
    #[arg(long)]
    pub max_command_len: Option<usize>,

    /// Maximum number of concurrent TCP connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Which task a task request is answered with
    #[arg(long, value_enum)]
    pub reply_mode: Option<ReplyMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// UDP address to bind to
    #[serde(default = "default_udp_listen")]
    pub udp_listen: String,
    /// TCP address to bind to
    #[serde(default = "default_tcp_listen")]
    pub tcp_listen: String,
    /// Optional uppercase echo endpoint
    pub echo_listen: Option<String>,
    /// Maximum number of concurrent TCP connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            udp_listen: default_udp_listen(),
            tcp_listen: default_tcp_listen(),
            echo_listen: None,
            max_connections: default_max_connections(),
            workers: None,
        }
    }
}

/// Wire protocol limits and behavior
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
    #[serde(default = "default_max_command_len")]
    pub max_command_len: usize,
    #[serde(default)]
    pub reply_mode: ReplyMode,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: default_max_datagram_size(),
            max_command_len: default_max_command_len(),
            reply_mode: ReplyMode::default(),
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

fn default_udp_listen() -> String {
    "127.0.0.1:1234".to_string()
}

fn default_tcp_listen() -> String {
    "127.0.0.1:1301".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_datagram_size() -> usize {
    64
}

fn default_max_command_len() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub udp_listen: String,
    pub tcp_listen: String,
    pub echo_listen: Option<String>,
    pub max_datagram_size: usize,
    pub max_command_len: usize,
    pub max_connections: usize,
    pub workers: Option<usize>,
    pub reply_mode: ReplyMode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            udp_listen: cli.udp_listen.unwrap_or(toml_config.server.udp_listen),
            tcp_listen: cli.tcp_listen.unwrap_or(toml_config.server.tcp_listen),
            echo_listen: cli.echo_listen.or(toml_config.server.echo_listen),
            max_datagram_size: cli
                .max_datagram_size
                .unwrap_or(toml_config.protocol.max_datagram_size),
            max_command_len: cli
                .max_command_len
                .unwrap_or(toml_config.protocol.max_command_len),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            workers: cli.workers.or(toml_config.server.workers),
            reply_mode: cli.reply_mode.unwrap_or(toml_config.protocol.reply_mode),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        let toml_config = TomlConfig::default();
        Config {
            udp_listen: toml_config.server.udp_listen,
            tcp_listen: toml_config.server.tcp_listen,
            echo_listen: None,
            max_datagram_size: toml_config.protocol.max_datagram_size,
            max_command_len: toml_config.protocol.max_command_len,
            max_connections: toml_config.server.max_connections,
            workers: None,
            reply_mode: toml_config.protocol.reply_mode,
            log_level: toml_config.logging.level,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
