//! Rate-limited batch dispatch over a finite sequence of items.
//!
//! This module defines [`BatchExecutor`], which fans a known sequence of items
//! out to a [`Handler`] with:
//!
//! - A cap on in-flight invocations ([`BatchConfig::concurrency`]).
//! - Optional admission rate limiting through a [`RateLimiter`], checked in
//!   the dispatching task *before* each item starts. This throttles the rate
//!   at which work begins, independent of how long each item takes.
//! - Panic isolation around every invocation.
//! - One of two [`ErrorPolicy`]s: fail-fast or collect-and-continue.
//!
//! Items are considered for dispatch in input order; completion order is
//! unspecified.

mod config;
mod group;
#[cfg(test)]
mod tests;

pub use config::*;

use crate::{
    Handler, RateLimiter,
    error::{BatchError, ItemFailure, Result},
    fault::isolate,
};
use group::TaskGroup;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a finite batch of items through a handler with bounded concurrency.
///
/// The executor only holds its [`BatchConfig`]; every call to
/// [`Self::execute`] builds its own task group, limiter and failure list, so
/// concurrent calls never interfere.
///
/// # Example
///
/// ```
/// use ferropool::{BatchConfig, BatchExecutor};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap().block_on(async {
/// let executor = BatchExecutor::new(BatchConfig::default().with_concurrency(4));
/// let ctx = CancellationToken::new();
///
/// let result = executor
///     .execute(&ctx, 1..=100_u32, |_ctx: CancellationToken, n: u32| async move {
///         if n == 42 { Err("unlucky") } else { Ok(()) }
///     })
///     .await;
///
/// let err = result.unwrap_err();
/// assert_eq!(err.index(), Some(41));
/// # });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor {
    config: BatchConfig,
}

impl BatchExecutor {
    /// Creates an executor with the given configuration.
    pub const fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// The configuration captured at construction.
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Dispatches every item of `items` to `handler` and waits for all of them.
    ///
    /// Dispatch proceeds in input order. Before each item the executor checks
    /// whether its derived token has been cancelled (by `ctx` or by a fail-fast
    /// failure), waits for the rate limiter if one is configured, and waits
    /// for a free concurrency slot. Handlers receive the derived token.
    ///
    /// A handler that panics is logged and treated as a success for its item.
    /// It never triggers fail-fast cancellation.
    ///
    /// An empty `items` returns immediately without building a limiter or
    /// spawning anything. Cancelling `ctx` before the first dispatch returns
    /// `Ok(())` with nothing run.
    ///
    /// # Errors
    ///
    /// - [`BatchError::Item`] under [`ErrorPolicy::FailFast`]: the first
    ///   handler error to complete.
    /// - [`BatchError::Aggregate`] under [`ErrorPolicy::CollectAndContinue`]:
    ///   every handler error, in completion order.
    /// - [`BatchError::Admission`]: `ctx` was cancelled while waiting on the
    ///   rate limiter. Reported under either policy.
    pub async fn execute<T, H, I>(
        &self,
        ctx: &CancellationToken,
        items: I,
        handler: H,
    ) -> Result<(), H::Error>
    where
        I: IntoIterator<Item = T>,
        T: Send + 'static,
        H: Handler<T>,
    {
        let mut items = items.into_iter().enumerate().peekable();
        if items.peek().is_none() {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Dispatching batch with {:?}", self.config);

        let handler = Arc::new(handler);
        let policy = self.config.error_policy();
        let limiter = self
            .config
            .rate_limit()
            .map(|rate| RateLimiter::new(rate, self.config.burst()));
        let failures: Arc<Mutex<Vec<ItemFailure<H::Error>>>> = Arc::default();
        let mut group = TaskGroup::new(self.config.concurrency(), ctx);
        let mut admission = None;

        for (index, item) in items {
            if group.token().is_cancelled() {
                #[cfg(feature = "tracing")]
                tracing::debug!("Batch cancelled before item {index}");
                break;
            }

            if let Some(limiter) = &limiter {
                if let Err(reason) = limiter.acquire(group.token()).await {
                    admission = Some(BatchError::Admission { index, reason });
                    break;
                }
            }

            let handler = Arc::clone(&handler);
            let failures = Arc::clone(&failures);
            let token = group.token().clone();
            let task = async move {
                match isolate(async { handler.handle(token, item).await }).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(error)) => match policy {
                        ErrorPolicy::FailFast => Err(BatchError::Item { index, error }),
                        ErrorPolicy::CollectAndContinue => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!("Item {index} failed: {error}");
                            failures.lock().push(ItemFailure { index, error });
                            Ok(())
                        }
                    },
                    Err(_fault) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!("Panic recovered processing item {index}: {_fault}");
                        Ok(())
                    }
                }
            };

            if !group.spawn(task).await {
                #[cfg(feature = "tracing")]
                tracing::debug!("Batch cancelled while item {index} waited for a slot");
                break;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Waiting for {} in-flight items", group.len());

        // A fail-fast failure cancels the group token, which can also abort a
        // pending limiter wait. The handler error is the real cause.
        group.wait().await?;
        if let Some(err) = admission {
            return Err(err);
        }

        let failures = core::mem::take(&mut *failures.lock());
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BatchError::Aggregate { failures })
        }
    }
}
