use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Listening endpoint and the application description advertised by GetEndpoints.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EndpointConfig {
    /// Bind address
    ///
    /// Default: `0.0.0.0`
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port, `4840` by default. Port 0 binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional path suffix of the endpoint URL, without the leading slash
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    #[serde(default = "default_product_uri")]
    pub product_uri: String,

    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: String::new(),
            application_uri: default_application_uri(),
            product_uri: default_product_uri(),
            application_name: default_application_name(),
        }
    }
}

impl EndpointConfig {
    /// Renders `opc.tcp://<host>:<port>[/<path>]`.
    pub fn endpoint_url(&self) -> String {
        let path = self.path.trim_matches('/');
        if path.is_empty() {
            format!("opc.tcp://{}:{}", self.host, self.port)
        } else {
            format!("opc.tcp://{}:{}/{}", self.host, self.port, path)
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message("endpoint.host cannot be empty".into())));
        }
        if self.application_uri.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "endpoint.application_uri cannot be empty".into(),
            )));
        }
        crate::network::EndpointUrl::parse(&self.endpoint_url())
            .map_err(|e| Error::Config(ConfigError::Message(format!("endpoint: {e}"))))?;
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4840
}

fn default_application_uri() -> String {
    "urn:ua-engine:simulator".to_string()
}

fn default_product_uri() -> String {
    "urn:ua-engine".to_string()
}

fn default_application_name() -> String {
    "UA Engine Simulator".to_string()
}
