//! Backend trait and the shared flush loop.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::NotifyError;
use crate::message::Message;

/// Default period between two webhook deliveries.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout of one webhook request.
pub(crate) const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// A queue of messages delivered to a chat webhook.
///
/// `push` never blocks on the network; delivery happens in
/// [`flush`](Self::flush), normally driven by [`spawn_flusher`].
#[async_trait]
pub trait NotifyBackend: Send + Sync + Debug {
    /// Queues a message.
    fn push(&self, message: Message);

    /// Number of queued messages.
    fn pending(&self) -> usize;

    /// Delivers the next batch and returns how many messages it carried.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook cannot be reached or rejects the
    /// batch. The batch is dropped either way.
    async fn flush(&self) -> Result<usize, NotifyError>;

    /// Returns the backend name for identification.
    fn name(&self) -> &'static str;
}

/// Runs `backend.flush()` every `interval` until `shutdown` turns true or
/// its sender is dropped, then drains what is left.
///
/// Delivery failures are logged and the failed batch is discarded.
pub fn spawn_flusher(
    backend: Arc<dyn NotifyBackend>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if backend.pending() > 0 {
                        deliver(backend.as_ref()).await;
                    }
                }
            }
        }

        // Every flush removes its batch, so this terminates.
        while backend.pending() > 0 {
            deliver(backend.as_ref()).await;
        }
        tracing::debug!(backend = backend.name(), "Notification flusher stopped");
    })
}

async fn deliver(backend: &dyn NotifyBackend) {
    match backend.flush().await {
        Ok(sent) => {
            tracing::trace!(backend = backend.name(), sent, "Delivered notifications");
        }
        Err(e) => {
            tracing::error!(backend = backend.name(), error = %e, "Failed to deliver notifications");
        }
    }
}
