//! Echo server configuration.

use super::{load_file, ConfigError, LoggingConfig};
use crate::upgrade::OriginPolicy;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the echo server
#[derive(Parser, Debug, Default)]
#[command(name = "wsecho-server")]
#[command(version = "0.1.0")]
#[command(about = "A WebSocket echo server", long_about = None)]
pub struct ServerArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Path that accepts WebSocket upgrades
    #[arg(short = 'p', long)]
    pub path: Option<String>,

    /// Maximum number of concurrent connections
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Milliseconds a client may take to send its request headers
    #[arg(long)]
    pub header_read_timeout_ms: Option<u64>,

    /// WebSocket read buffer size in bytes
    #[arg(long)]
    pub read_buffer_size: Option<usize>,

    /// WebSocket write buffer size in bytes
    #[arg(long)]
    pub write_buffer_size: Option<usize>,

    /// Largest accepted message in bytes
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Allowed Origin header value (repeatable; omit to allow any origin)
    #[arg(long = "allow-origin")]
    pub allowed_origins: Vec<String>,

    /// Serve a welcome page on GET /
    #[arg(long)]
    pub welcome_page: bool,

    /// Prefix prepended to echoed text messages
    #[arg(long)]
    pub prefix: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ServerFileConfig {
    #[serde(default)]
    pub server: ListenerSection,
    #[serde(default)]
    pub websocket: WebSocketSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub echo: EchoSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ListenerSection {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Upgrade path
    #[serde(default = "default_path")]
    pub path: String,
    /// Connection limit
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle or slow clients are dropped after this long without full headers
    #[serde(default = "default_header_read_timeout_ms")]
    pub header_read_timeout_ms: u64,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            max_connections: default_max_connections(),
            header_read_timeout_ms: default_header_read_timeout_ms(),
        }
    }
}

/// WebSocket framing and handshake configuration
#[derive(Debug, Deserialize)]
pub struct WebSocketSection {
    #[serde(default = "default_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(default = "default_buffer_size")]
    pub write_buffer_size: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Empty means any origin is accepted
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for WebSocketSection {
    fn default() -> Self {
        Self {
            read_buffer_size: default_buffer_size(),
            write_buffer_size: default_buffer_size(),
            max_message_size: default_max_message_size(),
            allowed_origins: Vec::new(),
        }
    }
}

/// Plain HTTP surface
#[derive(Debug, Deserialize, Default)]
pub struct HttpSection {
    #[serde(default)]
    pub welcome_page: bool,
}

/// Echo behavior
#[derive(Debug, Deserialize, Default)]
pub struct EchoSection {
    pub prefix: Option<String>,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_header_read_timeout_ms() -> u64 {
    30_000
}

fn default_buffer_size() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 << 20 // 64 MiB
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: String,
    pub path: String,
    pub max_connections: usize,
    pub header_read_timeout: Duration,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub max_message_size: usize,
    pub allowed_origins: Vec<String>,
    pub welcome_page: bool,
    pub prefix: Option<String>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::merge(ServerArgs::default(), ServerFileConfig::default())
    }
}

impl ServerConfig {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerArgs::parse())
    }

    /// Resolve parsed arguments against the config file they name.
    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        let file: ServerFileConfig = load_file(args.config.as_deref())?;
        let config = Self::merge(args, file);
        config.validate()?;
        Ok(config)
    }

    fn merge(cli: ServerArgs, file: ServerFileConfig) -> Self {
        ServerConfig {
            listen: cli.listen.unwrap_or(file.server.listen),
            path: cli.path.unwrap_or(file.server.path),
            max_connections: cli.max_connections.unwrap_or(file.server.max_connections),
            header_read_timeout: Duration::from_millis(
                cli.header_read_timeout_ms
                    .unwrap_or(file.server.header_read_timeout_ms),
            ),
            read_buffer_size: cli
                .read_buffer_size
                .unwrap_or(file.websocket.read_buffer_size),
            write_buffer_size: cli
                .write_buffer_size
                .unwrap_or(file.websocket.write_buffer_size),
            max_message_size: cli
                .max_message_size
                .unwrap_or(file.websocket.max_message_size),
            allowed_origins: if cli.allowed_origins.is_empty() {
                file.websocket.allowed_origins
            } else {
                cli.allowed_origins
            },
            welcome_page: cli.welcome_page || file.http.welcome_page,
            prefix: cli.prefix.or(file.echo.prefix),
            log_level: cli.log_level.unwrap_or(file.logging.level),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "upgrade path '{}' must start with '/'",
                self.path
            )));
        }
        if self.path == "/" && self.welcome_page {
            return Err(ConfigError::Invalid(
                "upgrade path '/' is taken by the welcome page".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.header_read_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "header_read_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "buffer sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Origin policy handed to the upgrader.
    pub fn origin_policy(&self) -> OriginPolicy {
        if self.allowed_origins.is_empty() {
            OriginPolicy::Any
        } else {
            OriginPolicy::AllowList(self.allowed_origins.clone())
        }
    }
}
