use crate::{Handler, fault::isolate};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// A receiver shared by every worker of one pool.
pub(crate) type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

/// Asynchronous task representing a single worker's lifecycle.
///
/// Each worker competes with its siblings for the next item on the shared
/// channel, runs the handler on it, and exits cleanly when either:
/// - The channel is closed and drained,
/// - The governing token is cancelled.
///
/// Cancellation is checked first on every iteration, so a worker that sees
/// both a pending item and a cancelled token stops without taking the item.
/// A handler already running is never interrupted.
///
/// # Arguments
/// - `worker_id`: Identifier used for logging.
/// - `rx`: The pool's shared channel receiver.
/// - `handler`: The pool's handler.
/// - `ctx`: Token passed to every handler call and watched between items.
pub(crate) async fn worker_loop<T, H>(
    worker_id: usize,
    rx: SharedReceiver<T>,
    handler: Arc<H>,
    ctx: CancellationToken,
) where
    T: Send + 'static,
    H: Handler<T>,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    loop {
        let item = tokio::select! {
            biased;
            () = ctx.cancelled() => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} shutdown via cancellation token");
                break;
            }
            item = recv(&rx) => item,
        };

        let Some(item) = item else {
            #[cfg(feature = "tracing")]
            tracing::debug!("Worker {worker_id} channel closed");
            break;
        };

        match isolate(async { handler.handle(ctx.clone(), item).await }).await {
            Ok(Ok(())) => {}
            Ok(Err(_e)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} handler returned error: {_e}");
            }
            Err(_fault) => {
                #[cfg(feature = "tracing")]
                tracing::error!("[Worker {worker_id}] {_fault}");
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}

/// Takes the next item, holding the receiver lock only while waiting.
///
/// Dropping this future (because cancellation won the race) releases the
/// lock without losing an item: `mpsc::Receiver::recv` is cancel safe.
async fn recv<T>(rx: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    rx.lock().await.recv().await
}
