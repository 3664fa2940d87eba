use core::future::Future;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

/// A set of tasks with a cap on how many run at once, sharing one derived
/// cancellation token.
///
/// The first task to return `Err` (in completion order) has its error kept and
/// cancels the group's token. Tasks already running are left alone; the token
/// only tells the dispatcher to stop handing out new work.
pub(crate) struct TaskGroup<E> {
    tasks: JoinSet<()>,
    permits: Arc<Semaphore>,
    token: CancellationToken,
    first_error: Arc<Mutex<Option<E>>>,
}

impl<E> TaskGroup<E>
where
    E: Send + 'static,
{
    /// Creates a group running at most `limit` tasks (at least one), bound to
    /// a child of `parent`.
    pub(crate) fn new(limit: usize, parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: Arc::new(Semaphore::new(limit.max(1))),
            token: parent.child_token(),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The group's token. Cancelled by the first failing task, by the parent,
    /// or when the group finishes.
    pub(crate) const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of tasks spawned and not yet joined.
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Waits for a free slot and spawns `fut` into it.
    ///
    /// Returns `false` without spawning if the group's token is cancelled
    /// before a slot frees up.
    pub(crate) async fn spawn<F>(&mut self, fut: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            () = self.token.cancelled() => return false,
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                // The semaphore is never closed.
                Err(_) => return false,
            },
        };

        self.reap();

        let token = self.token.clone();
        let first_error = Arc::clone(&self.first_error);
        self.tasks.spawn(async move {
            let result = fut.await;
            drop(permit);

            if let Err(e) = result {
                {
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(e);
                    }
                }
                token.cancel();
            }
        });
        true
    }

    /// Drops tasks that have already finished so the set stays bounded by
    /// the limit rather than by the number of items spawned.
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            if let Err(_e) = joined {
                #[cfg(feature = "tracing")]
                tracing::error!("Task failed to join: {_e}");
            }
        }
    }

    /// Waits for every spawned task, then returns the first recorded error.
    pub(crate) async fn wait(mut self) -> Result<(), E> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(_e) = joined {
                #[cfg(feature = "tracing")]
                tracing::error!("Task failed to join: {_e}");
            }
        }
        self.token.cancel();

        match self.first_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
