use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::ServerContext;
use crate::network::serve_connections;
use crate::utils::async_task::spawn_task;
use crate::RequestDispatcher;
use crate::Result;
use crate::SimulationDriver;
use crate::SystemError;

/// A built server: component graph plus the background tasks that drive it.
pub struct Server {
    ctx: Arc<ServerContext>,
    dispatcher: RequestDispatcher,
    shutdown_signal: watch::Receiver<()>,
}

impl Server {
    pub(super) fn new(
        ctx: Arc<ServerContext>,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            dispatcher: RequestDispatcher::new(ctx.clone()),
            ctx,
            shutdown_signal,
        }
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    /// Binds the configured endpoint and serves until shutdown.
    pub async fn run(self) -> Result<()> {
        let address = self.ctx.config.endpoint.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| SystemError::ServerStartFailed(format!("bind {address}: {e}")))?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until the shutdown signal fires,
    /// then closes every channel and session and waits for the background tasks.
    pub async fn serve(
        self,
        listener: TcpListener,
    ) -> Result<()> {
        info!(
            endpoint = %self.ctx.config.endpoint.endpoint_url(),
            local = ?listener.local_addr().ok(),
            "server listening"
        );

        let mut handles = Vec::new();
        self.spawn_background_tasks(&mut handles);

        let result = serve_connections(listener, self.dispatcher.clone(), self.shutdown_signal.clone()).await;

        self.ctx.shutdown();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("background task ended abnormally: {e}");
            }
        }
        info!("server stopped");
        result
    }

    fn spawn_background_tasks(
        &self,
        handles: &mut Vec<JoinHandle<()>>,
    ) {
        let publisher = self.ctx.publisher.clone();
        let shutdown = self.shutdown_signal.clone();
        spawn_task(
            "publish_scheduler",
            move || async move {
                publisher.run(shutdown).await;
                Ok(())
            },
            Some(&mut *handles),
        );

        let ctx = self.ctx.clone();
        let shutdown = self.shutdown_signal.clone();
        let period = Duration::from_millis(self.ctx.config.channel.sweep_interval_ms);
        spawn_task(
            "channel_sweep",
            move || sweep_loop("channel", period, shutdown, move || ctx.sweep_channels()),
            Some(&mut *handles),
        );

        let ctx = self.ctx.clone();
        let shutdown = self.shutdown_signal.clone();
        let period = Duration::from_millis(self.ctx.config.session.sweep_interval_ms);
        spawn_task(
            "session_sweep",
            move || sweep_loop("session", period, shutdown, move || ctx.sweep_sessions()),
            Some(&mut *handles),
        );

        let simulation = &self.ctx.config.simulation;
        if simulation.enabled {
            let driver = SimulationDriver::new(simulation, self.ctx.address_space.clone());
            let shutdown = self.shutdown_signal.clone();
            spawn_task("simulation_driver", move || driver.run(shutdown), Some(handles));
        }
    }
}

/// Runs `sweep` every `period` until shutdown.
pub(crate) async fn sweep_loop<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<()>,
    sweep: F,
) -> Result<()>
where
    F: Fn() -> usize + Send + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("{name} sweep stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                let closed = sweep();
                if closed > 0 {
                    debug!(closed, "{name} sweep");
                }
            }
        }
    }
}
