use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Transport-level limits applied to every client connection
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Largest frame accepted or sent, header included
    ///
    /// Default: 4 MiB
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    #[serde(default = "default_buffer_size")]
    pub receive_buffer_size: u32,

    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: u32,

    /// Time allowed between accept and the HEL message
    #[serde(default = "default_hello_timeout_ms")]
    pub hello_timeout_ms: u64,

    /// Concurrent connections; further sockets are answered with ERR and closed
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            receive_buffer_size: default_buffer_size(),
            send_buffer_size: default_buffer_size(),
            hello_timeout_ms: default_hello_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_message_size < 8192 {
            return Err(Error::Config(ConfigError::Message(format!(
                "network.max_message_size {} is below the 8192 byte minimum",
                self.max_message_size
            ))));
        }
        if self.receive_buffer_size < 8192 || self.send_buffer_size < 8192 {
            return Err(Error::Config(ConfigError::Message(
                "network.receive_buffer_size and network.send_buffer_size must be at least 8192".into(),
            )));
        }
        if self.hello_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network.hello_timeout_ms must be greater than 0".into(),
            )));
        }
        if self.max_connections == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network.max_connections must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_max_message_size() -> usize {
    4 * 1024 * 1024
}

fn default_buffer_size() -> u32 {
    65535
}

fn default_hello_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> usize {
    100
}
