use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

const APP_DIR: &str = "ptystream";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        ConfigError::ValidationError {
            message: message.into(),
        }
    }
}

impl Config {
    /// `<config dir>/ptystream/config.toml`, or relative to the working
    /// directory when the platform has no config dir.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Read, parse and validate `path`. A missing file is not an error and
    /// yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bind = &self.server.bind_addr;
        if bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid(format!("Invalid bind address '{bind}'")));
        }
        if self.bridge.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("bridge.poll_interval_ms must be greater than 0"));
        }
        if self.bridge.output_buffer == 0 {
            return Err(ConfigError::invalid("bridge.output_buffer must be greater than 0"));
        }
        if self.command.program.trim().is_empty() {
            return Err(ConfigError::invalid("command.program must not be empty"));
        }
        Ok(())
    }
}
