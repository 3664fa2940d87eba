//! A fixed-size pool of workers draining one live channel.
//!
//! This module defines [`WorkerPool`], which runs N long-lived Tokio tasks over
//! a single [`mpsc::Receiver`]. The pool:
//!
//! - Races its workers for items; whichever worker is free takes the next one.
//! - Isolates panics per item so one bad item cannot take a worker down.
//! - Supports cooperative shutdown via a shared [`CancellationToken`].
//!
//! The pool is a fire-and-forget consumer. Errors returned by the handler are
//! logged at `debug` level and dropped; a caller that needs them must record
//! them from inside the handler.

mod worker;

use crate::Handler;
use std::sync::Arc;
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use worker::worker_loop;

/// A cooperative pool of asynchronous workers that run a [`Handler`] over
/// every item received from a channel.
///
/// # Example
///
/// ```
/// use ferropool::WorkerPool;
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap().block_on(async {
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// let pool = WorkerPool::new(4, move |_ctx: CancellationToken, n: usize| {
///     let counter = Arc::clone(&counter);
///     async move {
///         counter.fetch_add(n, Ordering::Relaxed);
///         Ok::<_, std::convert::Infallible>(())
///     }
/// });
///
/// let (tx, rx) = mpsc::channel(8);
/// tokio::spawn(async move {
///     for n in 1..=10 {
///         tx.send(n).await.unwrap();
///     }
/// });
///
/// pool.start(&CancellationToken::new(), rx).await;
/// assert_eq!(seen.load(Ordering::Relaxed), 55);
/// # });
/// ```
#[derive(Debug)]
pub struct WorkerPool<H> {
    concurrency: usize,
    handler: Arc<H>,
}

impl<H> WorkerPool<H> {
    /// Creates a pool of `concurrency` workers (at least one) sharing
    /// `handler`.
    pub fn new(concurrency: usize, handler: H) -> Self {
        Self {
            concurrency: concurrency.max(1),
            handler: Arc::new(handler),
        }
    }

    /// Number of workers spawned by [`Self::start`].
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Drains `rx` with the pool's workers until the channel is closed and
    /// empty, or `ctx` is cancelled.
    ///
    /// Returns only after every worker has exited; no task outlives this call.
    /// On cancellation, items still in the channel are left unread.
    ///
    /// Handler errors and panics are not reported to the caller.
    pub async fn start<T>(&self, ctx: &CancellationToken, rx: mpsc::Receiver<T>)
    where
        T: Send + 'static,
        H: Handler<T>,
    {
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.concurrency {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&self.handler),
                ctx.clone(),
            ));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Started {} workers", self.concurrency);

        while let Some(joined) = workers.join_next().await {
            if let Err(_e) = joined {
                #[cfg(feature = "tracing")]
                tracing::error!("Worker failed to join: {_e}");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool drained");
    }
}
