//! Echo client configuration.

use super::{load_file, ConfigError, LoggingConfig};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the echo client
#[derive(Parser, Debug)]
#[command(name = "wsecho-client")]
#[command(version = "0.1.0")]
#[command(about = "A WebSocket echo client", long_about = None)]
pub struct ClientArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server URL (e.g., ws://localhost:8080/ws)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Text sent on every tick
    #[arg(long)]
    pub payload: Option<String>,

    /// Milliseconds between sends
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Milliseconds to wait after sending the close frame
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Stop after this many messages
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Read messages from stdin instead of sending on a timer
    #[arg(short, long)]
    pub interactive: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct ClientFileConfig {
    #[serde(default)]
    pub client: SessionSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Session-related configuration
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_payload")]
    pub payload: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    pub count: Option<u64>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            url: default_url(),
            payload: default_payload(),
            interval_ms: default_interval_ms(),
            grace_ms: default_grace_ms(),
            count: None,
        }
    }
}

fn default_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_payload() -> String {
    "Hello, WebSocket!".to_string()
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_grace_ms() -> u64 {
    1000
}

/// Final resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub payload: String,
    pub interval: Duration,
    pub grace: Duration,
    pub count: Option<u64>,
    pub interactive: bool,
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ClientArgs::parse())
    }

    /// Resolve parsed arguments against the config file they name.
    pub fn from_args(args: ClientArgs) -> Result<Self, ConfigError> {
        let file: ClientFileConfig = load_file(args.config.as_deref())?;
        let interval_ms = args.interval_ms.unwrap_or(file.client.interval_ms);
        if interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(ClientConfig {
            url: args.url.unwrap_or(file.client.url),
            payload: args.payload.unwrap_or(file.client.payload),
            interval: Duration::from_millis(interval_ms),
            grace: Duration::from_millis(args.grace_ms.unwrap_or(file.client.grace_ms)),
            count: args.count.or(file.client.count),
            interactive: args.interactive,
            log_level: args.log_level.unwrap_or(file.logging.level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_args(ClientArgs::parse_from(["wsecho-client"])).unwrap();
        assert_eq!(config.url, "ws://localhost:8080/ws");
        assert_eq!(config.payload, "Hello, WebSocket!");
        assert_eq!(config.interval, Duration::from_secs(2));
        assert_eq!(config.grace, Duration::from_secs(1));
        assert_eq!(config.count, None);
        assert!(!config.interactive);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let file: ClientFileConfig = toml::from_str(
            r#"
            [client]
            url = "ws://127.0.0.1:9000/echo"
            interval_ms = 250
            count = 5
        "#,
        )
        .unwrap();
        assert_eq!(file.client.url, "ws://127.0.0.1:9000/echo");
        assert_eq!(file.client.payload, "Hello, WebSocket!");
        assert_eq!(file.client.interval_ms, 250);
        assert_eq!(file.client.grace_ms, 1000);
        assert_eq!(file.client.count, Some(5));
    }

    #[test]
    fn test_cli_values() {
        let args = ClientArgs::parse_from([
            "wsecho-client",
            "-u",
            "ws://example.test/ws",
            "--interval-ms",
            "50",
            "-n",
            "3",
            "-i",
        ]);
        let config = ClientConfig::from_args(args).unwrap();
        assert_eq!(config.url, "ws://example.test/ws");
        assert_eq!(config.interval, Duration::from_millis(50));
        assert_eq!(config.count, Some(3));
        assert!(config.interactive);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let args = ClientArgs::parse_from(["wsecho-client", "--interval-ms", "0"]);
        assert!(matches!(
            ClientConfig::from_args(args),
            Err(ConfigError::Invalid(_))
        ));
    }
}
