//! Configuration for the echo server and client.
//!
//! Both programs take command-line arguments and an optional TOML file.
//! CLI arguments take precedence over config file values, which take
//! precedence over built-in defaults.

mod client;
mod server;

pub use client::{ClientArgs, ClientConfig, ClientFileConfig};
pub use server::{ServerArgs, ServerConfig, ServerFileConfig};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

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

fn default_log_level() -> String {
    "info".to_string()
}

/// Read and parse a TOML file, or fall back to defaults when no path is given.
pub(crate) fn load_file<T>(path: Option<&Path>) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_without_path_uses_defaults() {
        let config: LoggingConfig = load_file(None).unwrap();
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let path = Path::new("/nonexistent/wsecho.toml");
        let err = load_file::<ServerFileConfig>(Some(path)).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
        assert!(err.to_string().contains("/nonexistent/wsecho.toml"));
    }

    #[test]
    fn test_load_bad_toml() {
        let path = std::env::temp_dir().join(format!("wsecho-bad-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"[server\nlisten = ").unwrap();
        drop(file);

        let err = load_file::<ServerFileConfig>(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse { .. }));

        std::fs::remove_file(&path).unwrap();
    }
}
