use core::{fmt, future::Future};
use tokio_util::sync::CancellationToken;

/// The unit of work executed for every item by both [`WorkerPool`] and
/// [`BatchExecutor`].
///
/// A handler receives a clone of the governing [`CancellationToken`] and takes
/// ownership of one item. It may be invoked concurrently from many tasks; the
/// engine never serializes calls across items.
///
/// Any `Fn(CancellationToken, T) -> Future<Output = Result<(), E>>` closure is
/// a handler:
///
/// ```
/// use ferropool::Handler;
/// use tokio_util::sync::CancellationToken;
///
/// fn assert_handler<T, H: Handler<T>>(_: &H) {}
///
/// let handler = |_ctx: CancellationToken, n: u32| async move {
///     if n % 2 == 0 { Ok(()) } else { Err(format!("odd: {n}")) }
/// };
/// assert_handler::<u32, _>(&handler);
/// ```
///
/// [`WorkerPool`]: crate::WorkerPool
/// [`BatchExecutor`]: crate::BatchExecutor
pub trait Handler<T>: Send + Sync + 'static {
    /// The failure a handler reports for an item it could not process.
    type Error: fmt::Display + fmt::Debug + Send + 'static;

    /// Processes a single item.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the item could not be processed. How that error is
    /// treated depends on the component running the handler.
    fn handle(
        &self,
        ctx: CancellationToken,
        item: T,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T, F, Fut, E> Handler<T> for F
where
    F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: fmt::Display + fmt::Debug + Send + 'static,
{
    type Error = E;

    fn handle(
        &self,
        ctx: CancellationToken,
        item: T,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self(ctx, item)
    }
}
