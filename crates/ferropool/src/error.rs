//! Error types produced by the batch dispatcher.
//!
//! ## Error Cases
//! - `Item`: a handler returned an error under the fail-fast policy.
//! - `Aggregate`: one or more handlers returned errors under the
//!   collect-and-continue policy.
//! - `Admission`: the rate limiter wait was cancelled before an item could be
//!   admitted.
//!
//! The worker pool never produces these; handler errors stay with the handler.

use core::fmt;

/// A result type for dispatcher outcomes.
pub type Result<T, E> = core::result::Result<T, BatchError<E>>;

/// A single handler failure tagged with the position of its item in the input
/// sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure<E> {
    /// Zero-based position of the item in the input.
    pub index: usize,
    /// The error returned by the handler.
    pub error: E,
}

impl<E: fmt::Display> fmt::Display for ItemFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {} failed: {}", self.index, self.error)
    }
}

/// Terminating outcome of [`BatchExecutor::execute`].
///
/// [`BatchExecutor::execute`]: crate::BatchExecutor::execute
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BatchError<E> {
    /// A handler failed under [`ErrorPolicy::FailFast`]. This is whichever
    /// failure completed first, not necessarily the lowest index.
    ///
    /// [`ErrorPolicy::FailFast`]: crate::ErrorPolicy::FailFast
    #[error("item {index} failed: {error}")]
    Item { index: usize, error: E },

    /// Every failure recorded under [`ErrorPolicy::CollectAndContinue`], in
    /// completion order. Never empty when produced by the executor.
    ///
    /// [`ErrorPolicy::CollectAndContinue`]: crate::ErrorPolicy::CollectAndContinue
    #[error("batch finished with {}", summarize(.failures))]
    Aggregate { failures: Vec<ItemFailure<E>> },

    /// The governing token was cancelled while waiting for a rate limiter
    /// token before dispatching item `index`.
    ///
    /// Never reported over a fail-fast [`BatchError::Item`]: a handler failure
    /// that interrupts the wait is returned instead.
    #[error("rate limiter error at index {index}: {reason}")]
    Admission { index: usize, reason: Cancelled },
}

fn summarize<E: fmt::Display>(failures: &[ItemFailure<E>]) -> String {
    match failures.first() {
        Some(first) => format!("{} error(s), first: {first}", failures.len()),
        None => String::from("0 error(s)"),
    }
}

impl<E> BatchError<E> {
    /// Number of item failures carried by this error.
    ///
    /// `Admission` carries none.
    pub fn count(&self) -> usize {
        match self {
            Self::Item { .. } => 1,
            Self::Aggregate { failures } => failures.len(),
            Self::Admission { .. } => 0,
        }
    }

    /// Index of the first failing item, or of the item that could not be
    /// admitted.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Item { index, .. } | Self::Admission { index, .. } => Some(*index),
            Self::Aggregate { failures } => failures.first().map(|f| f.index),
        }
    }

    /// The first handler error, if any.
    pub fn first(&self) -> Option<&E> {
        match self {
            Self::Item { error, .. } => Some(error),
            Self::Aggregate { failures } => failures.first().map(|f| &f.error),
            Self::Admission { .. } => None,
        }
    }
}

/// The wait was abandoned because its cancellation token fired.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[error("wait cancelled")]
pub struct Cancelled;
