use core::time::Duration;

/// Represents the result of attempting to take a token from a
/// [`RateLimiter`].
///
/// - [`Admission::Ready`] indicates a token was taken and work may start.
/// - [`Admission::Pending`] means the bucket is empty and no token was taken.
///   A token becomes available after `yield_for` has elapsed.
///
/// This allows non-blocking admission loops and clean backoff strategies.
///
/// # Example
///
/// ```
/// use core::num::NonZeroU32;
/// use ferropool::{Admission, RateLimiter};
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let limiter = RateLimiter::new(NonZeroU32::new(10).unwrap(), 1);
/// match limiter.try_acquire() {
///     Admission::Ready => println!("go"),
///     Admission::Pending { yield_for } => println!("back off for {yield_for:?}"),
/// }
/// # });
/// ```
///
/// [`RateLimiter`]: crate::RateLimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was taken.
    Ready,
    /// The bucket is empty.
    ///
    /// Wait at least `yield_for` before trying again.
    Pending {
        /// Time until the next token becomes available.
        yield_for: Duration,
    },
}

impl Admission {
    /// Returns `true` if a token was taken.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}
