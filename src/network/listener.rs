use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::codec::FramedWrite;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::handle_connection;
use super::Frame;
use super::UaCodec;
use crate::metrics::ACTIVE_CONNECTIONS;
use crate::ErrorMessage;
use crate::NetworkError;
use crate::RequestDispatcher;
use crate::Result;

/// Upper bound on writing the ERR frame to a peer over the connection limit.
const REJECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps the connection count and gauge in step with live handler tasks.
struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        ACTIVE_CONNECTIONS.inc();
        Self { active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        ACTIVE_CONNECTIONS.dec();
    }
}

/// Accepts connections until shutdown, one handler task per socket.
pub async fn serve_connections(
    listener: TcpListener,
    dispatcher: RequestDispatcher,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let network = dispatcher.context().config.network.clone();
    let active = Arc::new(AtomicUsize::new(0));
    info!(address = ?listener.local_addr().ok(), "accepting connections");

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.changed() => {
                info!("listener stopping");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("accept failed: {e}");
                    continue;
                }
            },
        };

        if active.load(Ordering::Acquire) >= network.max_connections {
            warn!(%peer, limit = network.max_connections, "connection limit reached");
            let error = NetworkError::TooManyConnections(network.max_connections);
            tokio::spawn(reject(stream, error, network.max_message_size));
            continue;
        }

        let guard = ConnectionGuard::new(active.clone());
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = handle_connection(stream, peer, dispatcher, shutdown).await {
                debug!(%peer, "connection ended with error: {e}");
            }
        });
    }
}

async fn reject(
    stream: TcpStream,
    error: NetworkError,
    max_message_size: usize,
) {
    let mut writer = FramedWrite::new(stream, UaCodec::server(max_message_size));
    let frame = Frame::Error(ErrorMessage {
        error: error.status_code(),
        reason: error.to_string(),
    });
    match timeout(REJECT_TIMEOUT, writer.send(frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("failed to send ERR to rejected peer: {e}"),
        Err(_) => debug!("rejected peer did not take the ERR frame in time"),
    }
}
