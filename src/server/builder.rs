//! Assembles a [`Server`] from configuration.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let server = ServerBuilder::new(None, shutdown_rx)?
//!     .build()?
//!     .start_metrics_server(shutdown_tx.subscribe())
//!     .ready()?;
//! server.run().await?;
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;
use tracing::info;

use super::Server;
use super::ServerContext;
use crate::metrics;
use crate::AddressSpace;
use crate::Result;
use crate::ServerConfig;
use crate::SimulationDriver;
use crate::SystemError;

pub struct ServerBuilder {
    pub(super) config: ServerConfig,
    pub(super) address_space: Option<Arc<AddressSpace>>,
    pub(super) shutdown_signal: watch::Receiver<()>,

    pub(super) server: Option<Server>,
}

impl ServerBuilder {
    /// Loads the layered configuration, optionally re-layering `config_path` on top, and validates it.
    pub fn new(
        config_path: Option<&str>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Result<Self> {
        let mut config = ServerConfig::new()?;
        if let Some(path) = config_path {
            info!("with_override_config from: {}", path);
            config = config.with_override_config(path)?;
        }
        Ok(Self::init(config.validate()?, shutdown_signal))
    }

    /// Starts from an already validated configuration.
    pub fn init(
        config: ServerConfig,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            config,
            address_space: None,
            shutdown_signal,
            server: None,
        }
    }

    /// Serves a prepared address space instead of the standard folder skeleton.
    pub fn address_space(
        mut self,
        address_space: Arc<AddressSpace>,
    ) -> Self {
        self.address_space = Some(address_space);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Creates the address space (plus simulated sensors when enabled) and wires the components.
    pub fn build(mut self) -> Result<Self> {
        let address_space = self
            .address_space
            .take()
            .unwrap_or_else(|| Arc::new(AddressSpace::with_standard_folders()));

        if self.config.simulation.enabled {
            SimulationDriver::install(&self.config.simulation, &address_space)?;
        }
        debug!(nodes = address_space.len(), "address space ready");

        let ctx = Arc::new(ServerContext::new(self.config.clone(), address_space));
        self.server = Some(Server::new(ctx, self.shutdown_signal.clone()));
        Ok(self)
    }

    /// Serves `/metrics` on the configured port when prometheus is enabled.
    pub fn start_metrics_server(
        self,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        if self.config.monitoring.prometheus_enabled {
            let port = self.config.monitoring.prometheus_port;
            tokio::spawn(async move {
                metrics::start_server(port, shutdown_signal).await;
            });
        }
        self
    }

    pub fn ready(self) -> Result<Server> {
        self.server
            .ok_or_else(|| SystemError::ServerStartFailed("server was not built".to_string()).into())
    }
}
