//! Configuration management for the server.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod endpoint;
mod limits;
mod monitoring;
mod network;
mod simulation;
pub use endpoint::*;
pub use limits::*;
pub use monitoring::*;
pub use network::*;
pub use simulation::*;


use std::env;
use std::path::PathBuf;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Environment variable prefix; `UA__ENDPOINT__PORT=4841` overrides `endpoint.port`.
pub const ENV_PREFIX: &str = "UA";

/// Main configuration container for the server
///
/// Combines all section configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub subscription: SubscriptionConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl ServerConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Callers MUST call `validate()` once all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/server.toml");
    /// std::env::set_var("UA__ENDPOINT__PORT", "4841");
    /// let cfg = ServerConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.endpoint.validate()?;
        self.network.validate()?;
        self.channel.validate()?;
        self.session.validate()?;
        self.subscription.validate()?;
        self.publish.validate()?;
        self.monitoring.validate()?;
        self.simulation.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// Directory for rolling log files
    ///
    /// Default: `./logs`
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

/// Shared helper for `min <= default <= max` style range checks.
pub(crate) fn validate_range(
    section: &str,
    name: &str,
    min: u64,
    default: u64,
    max: u64,
) -> Result<()> {
    if min == 0 {
        return Err(Error::Config(ConfigError::Message(format!(
            "{section}.min_{name} must be greater than 0"
        ))));
    }
    if min > max {
        return Err(Error::Config(ConfigError::Message(format!(
            "{section}.min_{name} ({min}) exceeds {section}.max_{name} ({max})"
        ))));
    }
    if default < min || default > max {
        return Err(Error::Config(ConfigError::Message(format!(
            "{section}.default_{name} ({default}) must lie within [{min}, {max}]"
        ))));
    }
    Ok(())
}
