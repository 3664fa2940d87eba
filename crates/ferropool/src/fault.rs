use core::{any::Any, fmt, future::Future, panic::AssertUnwindSafe};
use futures::FutureExt;

/// A panic caught while running a single handler invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    message: String,
}

impl Fault {
    /// Builds a fault from a panic payload.
    ///
    /// `&str` and `String` payloads (everything `panic!` produces) keep their
    /// message. Anything else is reported as an unknown panic.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&'static str>() {
                Some(message) => (*message).to_owned(),
                None => String::from("unknown panic"),
            },
        };
        Self { message }
    }

    /// The panic message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl core::error::Error for Fault {}

/// Runs `fut` to completion inside a failure-isolation boundary.
///
/// A panic raised while polling `fut` is caught and returned as a [`Fault`]
/// instead of unwinding into the caller's loop. Since handler futures are
/// lazy, a panic raised by the handler body before its first `.await` is
/// caught too.
///
/// The future is wrapped in [`AssertUnwindSafe`]: the engine never observes
/// state the handler might have left half-written, so unwind safety is the
/// handler's concern.
///
/// # Errors
///
/// Returns the caught [`Fault`] if `fut` panicked.
pub async fn isolate<F>(fut: F) -> Result<F::Output, Fault>
where
    F: Future,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .map_err(Fault::from_panic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_output_through() {
        let out = isolate(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn catches_static_str_panic() {
        let fault = isolate(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(fault.message(), "boom");
        assert_eq!(fault.to_string(), "panic: boom");
    }

    #[tokio::test]
    async fn catches_formatted_panic() {
        let item = 4;
        let fault = isolate(async move {
            if item == 4 {
                panic!("bad item {item}");
            }
        })
        .await
        .unwrap_err();
        assert_eq!(fault.message(), "bad item 4");
    }

    #[tokio::test]
    async fn catches_panic_after_await() {
        let fault = isolate(async {
            tokio::task::yield_now().await;
            std::panic::panic_any(42_u32);
        })
        .await
        .unwrap_err();
        assert_eq!(fault.message(), "unknown panic");
    }
}
