/*!
 * Configuration management for Alpaca Barn.
 *
 * Settings are layered: built-in defaults, then an optional configuration
 * file (YAML, TOML or JSON), then environment variables. Driver tables are
 * keyed by driver id; keys are case-insensitive and come out lowercase.
 */
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default port of the Alpaca REST server
pub const DEFAULT_API_PORT: u32 = 8080;

/// Default UDP port for Alpaca discovery
pub const DEFAULT_DISCOVERY_PORT: u32 = 32227;

/// Default driver refresh interval in seconds
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 10;

/// Gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server identity reported by the management API
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// REST server configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Discovery responder configuration
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Background refresh configuration
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Safety monitor drivers by kind
    #[serde(default)]
    pub monitors: MonitorsConfig,

    /// Weather station drivers by kind
    #[serde(default)]
    pub weather: WeatherStationsConfig,
}

/// Server identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Server name
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Manufacturer string
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Free-form location of the installation
    #[serde(default)]
    pub location: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error or a directive list)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// REST server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// TCP port to listen on
    #[serde(default = "default_api_port")]
    pub port: u32,
}

/// Discovery responder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Whether to answer discovery probes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// UDP port to listen on
    #[serde(default = "default_discovery_port")]
    pub port: u32,
}

/// Background refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds between refresh rounds; zero selects the default
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl RefreshConfig {
    /// The refresh interval as a duration
    pub fn interval(&self) -> Duration {
        match self.interval_secs {
            0 => Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// A rule deciding whether a monitor's raw content means "safe"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Regular expression, matched case-insensitively
    #[serde(default)]
    pub pattern: String,

    /// Negate the match result
    #[serde(default)]
    pub invert: bool,
}

/// A safety monitor polling a URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpMonitorConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// URL fetched on every refresh
    #[serde(default)]
    pub url: String,
    /// Matching rule
    #[serde(default)]
    pub rule: RuleConfig,
}

/// A safety monitor reading a local file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMonitorConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// File read on every refresh
    #[serde(default)]
    pub path: String,
    /// Matching rule
    #[serde(default)]
    pub rule: RuleConfig,
}

/// A safety monitor with a fixed verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DummyMonitorConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Verdict reported forever
    #[serde(default)]
    pub is_safe: bool,
}

/// Safety monitor tables by driver kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorsConfig {
    /// HTTP monitors by id
    #[serde(default)]
    pub http: BTreeMap<String, HttpMonitorConfig>,
    /// File monitors by id
    #[serde(default)]
    pub file: BTreeMap<String, FileMonitorConfig>,
    /// Dummy monitors by id
    #[serde(default)]
    pub dummy: BTreeMap<String, DummyMonitorConfig>,
}

/// A weather station polling a JSON feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpWeatherConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// URL of the station feed; an empty URL disables the driver
    #[serde(default)]
    pub url: String,
}

/// A weather station reporting zeros
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DummyWeatherConfig {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
}

/// Weather station tables by driver kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeatherStationsConfig {
    /// HTTP stations by id
    #[serde(default)]
    pub http: BTreeMap<String, HttpWeatherConfig>,
    /// Dummy stations by id
    #[serde(default)]
    pub dummy: BTreeMap<String, DummyWeatherConfig>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            manufacturer: default_manufacturer(),
            location: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_discovery_port(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
        }
    }
}

fn default_server_name() -> String {
    "Alpaca Barn".to_string()
}

fn default_manufacturer() -> String {
    "Alpaca Barn".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_port() -> u32 {
    DEFAULT_API_PORT
}

fn default_discovery_port() -> u32 {
    DEFAULT_DISCOVERY_PORT
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path.
    ///
    /// A path without an extension is treated as a base name, so `barn`
    /// picks up `barn.yaml`, `barn.toml` or `barn.json` when present.
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::from(path));
            } else if path.extension().is_none() {
                debug!("Looking for configuration files named {}", config_file);
                config_builder =
                    config_builder.add_source(File::with_name(&config_file).required(false));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!(
            monitors = config.monitors.http.len() + config.monitors.file.len() + config.monitors.dummy.len(),
            stations = config.weather.http.len() + config.weather.dummy.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }
}
