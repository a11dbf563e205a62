use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Prometheus `/metrics` endpoint, off by default.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_enabled: bool,

    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    /// Rejects port 0 and privileged ports once the endpoint is enabled.
    pub fn validate(&self) -> Result<()> {
        let reject = |message: String| -> Result<()> { Err(Error::Config(ConfigError::Message(message))) };
        match (self.prometheus_enabled, self.prometheus_port) {
            (true, 0) => reject("monitoring.prometheus_port must be set when prometheus is enabled".into()),
            (true, port) if port < 1024 => reject(format!(
                "monitoring.prometheus_port {port} is a privileged port"
            )),
            (false, port) if port != default_prometheus_port() => {
                warn!(port, "monitoring.prometheus_port is ignored while prometheus is disabled");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn default_prometheus_port() -> u16 {
    9090
}
