use crate::{Admission, error::Cancelled};
use core::{num::NonZeroU32, time::Duration};
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// A token-bucket rate limiter that throttles how often work may *start*.
///
/// The bucket holds up to `burst` tokens and refills at `rate` tokens per
/// second. Internally it tracks a single theoretical arrival time rather than
/// a fractional token count (the generic cell rate algorithm), so every
/// computation stays in whole [`Duration`]s:
///
/// - emission interval `T = 1s / rate`
/// - burst tolerance `τ = T × (burst - 1)`
/// - a request at `now` is admitted iff `max(tat, now) - τ <= now`, after
///   which `tat` advances by `T`.
///
/// A fresh limiter admits `burst` requests immediately and one every `T`
/// afterwards.
///
/// Time is read from [`tokio::time::Instant`], so a paused test runtime
/// drives the limiter deterministically.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    tolerance: Duration,
    tat: Mutex<Instant>,
}

impl RateLimiter {
    /// Creates a limiter admitting `rate` requests per second with a bucket
    /// of `burst` tokens.
    ///
    /// A `burst` of zero is coerced to one: an empty bucket could never admit
    /// anything.
    pub fn new(rate: NonZeroU32, burst: usize) -> Self {
        let burst = burst.max(1);
        let interval = Duration::from_secs(1) / rate.get();
        let tolerance = interval.saturating_mul(u32::try_from(burst - 1).unwrap_or(u32::MAX));
        Self {
            interval,
            tolerance,
            tat: Mutex::new(Instant::now()),
        }
    }

    /// Time between two admissions once the burst is spent.
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Attempts to take a token without waiting.
    ///
    /// Returns [`Admission::Pending`] with the time until the next token if
    /// the bucket is empty. A pending attempt takes nothing, so callers may
    /// simply retry after `yield_for`.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn try_acquire(&self) -> Admission {
        let now = Instant::now();
        let mut tat = self.tat.lock();

        let start = (*tat).max(now);
        let allow_at = start.checked_sub(self.tolerance).unwrap_or(now);
        if allow_at <= now {
            *tat = start + self.interval;
            Admission::Ready
        } else {
            Admission::Pending {
                yield_for: allow_at - now,
            }
        }
    }

    /// Waits until a token is available and takes it.
    ///
    /// The wait honours `ctx`: an already-cancelled token fails immediately,
    /// and cancellation during the wait wins over a token that becomes
    /// available at the same time.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if `ctx` fires before a token is taken. No
    /// token is consumed in that case.
    pub async fn acquire(&self, ctx: &CancellationToken) -> Result<(), Cancelled> {
        if ctx.is_cancelled() {
            return Err(Cancelled);
        }

        loop {
            let yield_for = match self.try_acquire() {
                Admission::Ready => return Ok(()),
                Admission::Pending { yield_for } => yield_for,
            };

            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(Cancelled),
                () = tokio::time::sleep(yield_for) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rps(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn admits_burst_then_throttles() {
        let limiter = RateLimiter::new(rps(5), 3);
        assert_eq!(limiter.interval(), Duration::from_millis(200));

        for _ in 0..3 {
            assert!(limiter.try_acquire().is_ready());
        }
        assert_eq!(
            limiter.try_acquire(),
            Admission::Pending {
                yield_for: Duration::from_millis(200)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pending_attempt_takes_nothing() {
        let limiter = RateLimiter::new(rps(10), 1);
        assert!(limiter.try_acquire().is_ready());
        assert!(!limiter.try_acquire().is_ready());
        assert!(!limiter.try_acquire().is_ready());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(limiter.try_acquire().is_ready());
        assert!(!limiter.try_acquire().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_burst_is_coerced_to_one() {
        let limiter = RateLimiter::new(rps(1), 0);
        assert!(limiter.try_acquire().is_ready());
        assert!(!limiter.try_acquire().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_refills_at_most_burst() {
        let limiter = RateLimiter::new(rps(10), 2);
        tokio::time::advance(Duration::from_secs(60)).await;

        assert!(limiter.try_acquire().is_ready());
        assert!(limiter.try_acquire().is_ready());
        assert!(!limiter.try_acquire().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_tokens() {
        let limiter = RateLimiter::new(rps(5), 1);
        let ctx = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire(&ctx).await.unwrap();
        }

        assert!(start.elapsed() >= Duration::from_millis(9 * 200));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_fails_when_already_cancelled() {
        let limiter = RateLimiter::new(rps(1), 1);
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert_eq!(limiter.acquire(&ctx).await, Err(Cancelled));
        // The token is still in the bucket.
        assert!(limiter.try_acquire().is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_is_interrupted_by_cancellation() {
        let limiter = RateLimiter::new(rps(1), 1);
        let ctx = CancellationToken::new();
        limiter.acquire(&ctx).await.unwrap();

        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        assert_eq!(limiter.acquire(&ctx).await, Err(Cancelled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
