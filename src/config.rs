//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PRINTRELAY_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied by `main`)

use printrelay_client::ConnectionConfig;
use printrelay_protocol::{endpoint_for_host, DEFAULT_ENDPOINT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon connection settings.
    pub connection: ConnectionSettings,
    /// Printer used by `config` when none is given on the command line.
    pub printer: PrinterSettings,
}

impl Config {
    /// Loads configuration from `path` (or PRINTRELAY_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("PRINTRELAY_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.connection.apply_overrides(&var);
        self.printer.apply_overrides(&var);
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()
    }
}

/// Daemon connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// WebSocket endpoint of the daemon.
    pub endpoint: String,
    /// Fixed delay between reconnect attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Bound on a single connect attempt, in seconds.
    pub connect_timeout_secs: u64,
    /// How long one-shot commands wait for the daemon's acknowledgement.
    pub ack_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            retry_delay_ms: 3000,
            connect_timeout_secs: 10,
            ack_timeout_secs: 10,
        }
    }
}

impl ConnectionSettings {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("PRINTRELAY_HOST") {
            self.endpoint = endpoint_for_host(&host);
        }
        // An explicit endpoint wins over a bare host.
        if let Some(endpoint) = var("PRINTRELAY_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(ms) = var("PRINTRELAY_RETRY_DELAY_MS") {
            if let Ok(parsed) = ms.parse() {
                self.retry_delay_ms = parsed;
            }
        }
        if let Some(secs) = var("PRINTRELAY_CONNECT_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.connect_timeout_secs = parsed;
            }
        }
        if let Some(secs) = var("PRINTRELAY_ACK_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.ack_timeout_secs = parsed;
            }
        }
    }

    /// Returns the retry delay as a Duration.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Returns the connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the acknowledgement timeout as a Duration.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Builds the client-side connection configuration.
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new()
            .with_retry_delay(self.retry_delay())
            .with_connect_timeout(self.connect_timeout())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "endpoint '{}' must start with ws:// or wss://",
                self.endpoint
            )));
        }
        if self.retry_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "retry_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default printer selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Printer name as known to the daemon host.
    pub name: Option<String>,
    /// Ask the daemon to log debug output.
    pub debug_log: bool,
}

impl PrinterSettings {
    fn apply_overrides(&mut self, var: &impl Fn(&str) -> Option<String>) {
        if let Some(name) = var("PRINTRELAY_PRINTER") {
            self.name = Some(name);
        }
        if let Some(debug) = var("PRINTRELAY_DEBUG_LOG") {
            self.debug_log = debug == "1" || debug.to_lowercase() == "true";
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    ParseError(PathBuf, String),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}
