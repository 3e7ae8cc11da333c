/*!
 * Configuration management for motorstate.
 *
 * This module provides functionality to load, validate, and access configuration
 * settings: output locations, logging, device naming, the writable parameter
 * catalog and the simulated device backend.
 */
use std::collections::BTreeMap;
use std::path::Path;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{AllowList, AttributeKey};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Device naming configuration
    #[serde(default)]
    pub devices: DevicesConfig,

    /// Writable parameter catalog
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Simulated device backend
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Directory snapshot files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// File name prefix of snapshot files
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Timeout for each endpoint call in milliseconds (0 means no timeout)
    #[serde(default)]
    pub operation_timeout_ms: u64,
}

/// Device naming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Beamline prefix of every endpoint address
    #[serde(default = "default_beamline")]
    pub beamline: String,

    /// Address domain of primary endpoints
    #[serde(default = "default_primary_domain")]
    pub primary_domain: String,

    /// Address domain of secondary endpoints
    #[serde(default = "default_secondary_domain")]
    pub secondary_domain: String,

    /// Known server groups
    #[serde(default = "default_server_groups")]
    pub server_groups: Vec<ServerGroupConfig>,
}

/// One server group and the number of motors it drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerGroupConfig {
    /// Group name, e.g. `EH1A`
    pub name: String,

    /// Number of devices, numbered `1..=devices`
    pub devices: u32,
}

/// Writable parameter catalog, keyed by endpoint class token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Attribute names per endpoint class (`oms`, `zmx`)
    #[serde(default = "default_catalog")]
    pub parameters: BTreeMap<String, Vec<String>>,
}

/// Simulated device backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// JSON file holding the state of every simulated endpoint
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            beamline: default_beamline(),
            primary_domain: default_primary_domain(),
            secondary_domain: default_secondary_domain(),
            server_groups: default_server_groups(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            parameters: default_catalog(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl DevicesConfig {
    /// Look up a server group by name, ignoring ASCII case
    pub fn server_group(&self, name: &str) -> Option<&ServerGroupConfig> {
        self.server_groups
            .iter()
            .find(|group| group.name.eq_ignore_ascii_case(name))
    }
}

impl CatalogConfig {
    /// Build the allow-list of writable attribute keys
    pub fn allow_list(&self) -> Result<AllowList> {
        let keys = self.parameters.iter().flat_map(|(class, names)| {
            names
                .iter()
                .map(move |name| AttributeKey::from(format!("{}:{}", class, name)))
        });

        AllowList::from_keys(keys)
            .map_err(|e| Error::config(format!("Invalid parameter catalog: {}", e)))
    }
}

fn default_app_name() -> String {
    "motorstate".to_string()
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_file_prefix() -> String {
    "motor_parameters".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_beamline() -> String {
    "p022".to_string()
}

fn default_primary_domain() -> String {
    "motor".to_string()
}

fn default_secondary_domain() -> String {
    "ZMX".to_string()
}

fn default_server_groups() -> Vec<ServerGroupConfig> {
    ["EH1A", "EH1B", "EH2A", "EH2B"]
        .iter()
        .map(|name| ServerGroupConfig {
            name: name.to_string(),
            devices: 47,
        })
        .collect()
}

fn default_catalog() -> BTreeMap<String, Vec<String>> {
    let oms = ["Acceleration", "Conversion", "BaseRate", "SlewRate", "SlewRateMax"];
    let zmx = [
        "AxisName",
        "RunCurrent",
        "StopCurrent",
        "BoostCurrent",
        "CurrentDelayTime",
        "StepResolution",
        "Deactivation",
    ];

    BTreeMap::from([
        ("oms".to_string(), oms.iter().map(|s| s.to_string()).collect()),
        ("zmx".to_string(), zmx.iter().map(|s| s.to_string()).collect()),
    ])
}

fn default_state_file() -> String {
    "./motor_state.json".to_string()
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

    /// Set the config file path
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
    ///
    /// Missing sections fall back to their defaults. A config file that was
    /// asked for but does not exist is an error.
    pub fn build(self) -> Result<Config> {
        let mut config_builder = ConfigLib::builder();

        if let Some(config_file) = self.config_file {
            if !Path::new(&config_file).exists() {
                return Err(Error::config(format!(
                    "Configuration file {} does not exist",
                    config_file
                )));
            }
            debug!("Loading configuration from {}", config_file);
            config_builder = config_builder.add_source(File::with_name(&config_file));
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

        info!("Configuration loaded successfully");
        Ok(config)
    }
}
