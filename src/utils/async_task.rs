use std::future::Future;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;

use crate::Result;

/// Spawns a named background task, logging its error on exit, and optionally tracks the handle.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        match task_fn().await {
            Ok(()) => debug!("spawned task: {name} exited"),
            Err(e) => error!("spawned task: {name} stopped or encountered an error: {:?}", e),
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
