//! Bounded-concurrency async work dispatch.
//!
//! Two engines share one [`Handler`] abstraction:
//!
//! - [`WorkerPool`] drains a live [`tokio::sync::mpsc`] channel with a fixed
//!   number of long-lived workers.
//! - [`BatchExecutor`] runs a finite sequence of items with a concurrency cap,
//!   an optional [`RateLimiter`] on admission, and an [`ErrorPolicy`].
//!
//! Both isolate handler panics per item and stop cooperatively through a
//! [`tokio_util::sync::CancellationToken`].

mod batch;
mod error;
mod fault;
mod handler;
mod limiter;
mod pool;
mod status;

pub use crate::batch::*;
pub use crate::error::*;
pub use crate::fault::*;
pub use crate::handler::*;
pub use crate::limiter::*;
pub use crate::pool::*;
pub use crate::status::*;
