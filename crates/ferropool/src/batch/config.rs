use core::num::NonZeroU32;

/// Default maximum number of in-flight handler invocations.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Default rate limiter bucket size.
pub const DEFAULT_BURST: usize = 1;

/// What the dispatcher does when a handler returns an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ErrorPolicy {
    /// Stop dispatching new items on the first returned error and report it.
    #[default]
    FailFast,
    /// Run every item and report all returned errors at the end.
    CollectAndContinue,
}

/// Execution settings for a [`BatchExecutor`].
///
/// Every field is coerced to a safe value on construction; invalid knobs are
/// corrected, never rejected. The config is a plain value: an executor copies
/// it when built and no two executors share it.
///
/// ```
/// use ferropool::{BatchConfig, ErrorPolicy};
///
/// let config = BatchConfig::default()
///     .with_concurrency(4)
///     .with_rate_limit(50)
///     .with_burst(0) // ignored
///     .with_ignore_error(true);
///
/// assert_eq!(config.concurrency(), 4);
/// assert_eq!(config.rate_limit().map(|r| r.get()), Some(50));
/// assert_eq!(config.burst(), 1);
/// assert_eq!(config.error_policy(), ErrorPolicy::CollectAndContinue);
/// ```
///
/// [`BatchExecutor`]: crate::BatchExecutor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchConfig {
    concurrency: usize,
    rate_limit: Option<NonZeroU32>,
    burst: usize,
    error_policy: ErrorPolicy,
}

impl Default for BatchConfig {
    /// Ten concurrent items, no rate limit, a burst of one, fail-fast.
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            rate_limit: None,
            burst: DEFAULT_BURST,
            error_policy: ErrorPolicy::FailFast,
        }
    }
}

impl BatchConfig {
    /// Builds a config from explicit values, coercing them all at once.
    ///
    /// - `concurrency` of zero becomes one.
    /// - `rate_limit` of `None` or zero disables rate limiting.
    /// - `burst` of zero becomes one.
    pub fn new(
        concurrency: usize,
        rate_limit: Option<u32>,
        burst: usize,
        error_policy: ErrorPolicy,
    ) -> Self {
        Self {
            concurrency: concurrency.max(1),
            rate_limit: rate_limit.and_then(NonZeroU32::new),
            burst: burst.max(1),
            error_policy,
        }
    }

    /// Sets the maximum number of in-flight invocations. Zero is ignored.
    #[must_use]
    pub fn with_concurrency(mut self, n: usize) -> Self {
        if n > 0 {
            self.concurrency = n;
        }
        self
    }

    /// Limits admissions to `rps` per second. Zero is ignored.
    #[must_use]
    pub fn with_rate_limit(mut self, rps: u32) -> Self {
        if let Some(rps) = NonZeroU32::new(rps) {
            self.rate_limit = Some(rps);
        }
        self
    }

    /// Sets the rate limiter bucket size. Zero is ignored.
    ///
    /// Only meaningful together with [`Self::with_rate_limit`].
    #[must_use]
    pub fn with_burst(mut self, n: usize) -> Self {
        if n > 0 {
            self.burst = n;
        }
        self
    }

    /// `true` selects [`ErrorPolicy::CollectAndContinue`], `false`
    /// [`ErrorPolicy::FailFast`].
    #[must_use]
    pub fn with_ignore_error(self, ignore: bool) -> Self {
        self.with_error_policy(if ignore {
            ErrorPolicy::CollectAndContinue
        } else {
            ErrorPolicy::FailFast
        })
    }

    /// Sets the error policy directly.
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Maximum number of in-flight handler invocations.
    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Admissions per second, or `None` when unlimited.
    pub const fn rate_limit(&self) -> Option<NonZeroU32> {
        self.rate_limit
    }

    /// Rate limiter bucket size.
    pub const fn burst(&self) -> usize {
        self.burst
    }

    /// What happens when a handler returns an error.
    pub const fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }
}
