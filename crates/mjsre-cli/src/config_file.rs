use std::{fs, io, path::Path, str::FromStr};

use math_core::MathCoreConfig;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

/// Name of the configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "mjsre.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// External typesetting engine. Without a command, the native backend is used.
    pub typesetter: EngineCommand,
    /// Configuration of the native backend.
    pub native: MathCoreConfig,
    /// External speech engine.
    pub speech: EngineCommand,
    pub log: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineCommand {
    /// Program and arguments, e.g. `["node", "typeset.js"]`.
    pub command: Vec<String>,
}

impl EngineCommand {
    pub fn is_configured(&self) -> bool {
        !self.command.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LogConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level).map_err(|_| ConfigError::LogLevel(self.level.clone()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Error type for configuration loading operations.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error when reading the file.
    Io(io::Error),
    /// TOML parsing error.
    Parse(toml::de::Error),
    /// Unknown log level.
    LogLevel(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error: {}", err),
            ConfigError::Parse(err) => write!(f, "TOML parsing error: {}", err),
            ConfigError::LogLevel(level) => write!(f, "invalid log level: {:?}", level),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::LogLevel(_) => None,
        }
    }
}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err)
    }
}

/// Loads the configuration from a TOML file.
///
/// An explicitly given `path` has to exist. Without one, [`DEFAULT_CONFIG_FILE`] is read if it
/// exists, and the defaults are used otherwise.
pub fn load_config_file(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(path) => path,
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            if !fallback.is_file() {
                return Ok(Config::default());
            }
            fallback
        }
    };
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[inline]
fn parse_config(s: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(s)?;
    config.log.level_filter()?;
    Ok(config)
}
