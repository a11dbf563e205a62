use std::fmt;

use url::Url;

use crate::NetworkError;

pub const OPC_TCP_SCHEME: &str = "opc.tcp";
pub const DEFAULT_PORT: u16 = 4840;

/// Parsed `opc.tcp://host[:port][/path]` endpoint address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    host: String,
    port: u16,
    path: String,
}

impl EndpointUrl {
    pub fn parse(input: &str) -> Result<Self, NetworkError> {
        let url = Url::parse(input).map_err(|e| NetworkError::InvalidEndpointUrl(format!("{input}: {e}")))?;

        if url.scheme() != OPC_TCP_SCHEME {
            return Err(NetworkError::InvalidEndpointUrl(format!(
                "{input}: scheme must be {OPC_TCP_SCHEME}"
            )));
        }
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(NetworkError::InvalidEndpointUrl(format!("{input}: missing host"))),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            path: url.path().trim_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path without surrounding slashes; empty for the root endpoint.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host and port seen by a client need not match the bind address; only the path identifies the endpoint.
    pub fn same_endpoint(
        &self,
        other: &EndpointUrl,
    ) -> bool {
        self.path == other.path
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{OPC_TCP_SCHEME}://{}:{}", self.host, self.port)
        } else {
            write!(f, "{OPC_TCP_SCHEME}://{}:{}/{}", self.host, self.port, self.path)
        }
    }
}
