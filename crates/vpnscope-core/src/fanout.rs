//! Bounded-concurrency fan-out.
//!
//! One [`BoundedFanout`] owns a semaphore shared by every batch it runs, so the total number of
//! running tasks is bounded by the pool width no matter how many batches are outstanding. Each
//! batch gets its own `JoinSet`; when the batch ceiling elapses, or the batch future is dropped,
//! its outstanding tasks are aborted and reported as [`TaskOutcome::Abandoned`].
//!
//! ```text
//!  run(items, ceiling, f)
//!     │
//!     ├── spawn task 0 ─┐
//!     ├── spawn task 1 ─┼── acquire pool permit ── f(item) ── (index, result)
//!     └── spawn task n ─┘
//!     │
//!     └── join until all done or ceiling ── abort rest ── results in input order
//! ```

use futures_util::FutureExt;
use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::debug;

/// Result of one task in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Completed(T),
    /// The task panicked; carries the panic message.
    Panicked(String),
    /// The task did not finish before the ceiling, or the pool was shut down.
    Abandoned,
}

impl<T> TaskOutcome<T> {
    #[must_use]
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Panicked(_) | Self::Abandoned => None,
        }
    }
}

/// Semaphore-bounded task group reused across batches.
#[derive(Debug, Clone)]
pub struct BoundedFanout {
    permits: Arc<Semaphore>,
    width: usize,
}

impl BoundedFanout {
    #[must_use]
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        Self { permits: Arc::new(Semaphore::new(width)), width }
    }

    /// Half the available cores, at least 1.
    #[must_use]
    pub fn default_width() -> usize {
        std::thread::available_parallelism().map_or(1, |n| n.get() / 2).max(1)
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Runs `f` over every item with at most `width` tasks in flight across the pool.
    ///
    /// Results are returned in input order regardless of completion order.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, ceiling: Duration, f: F) -> Vec<TaskOutcome<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut slots: Vec<TaskOutcome<T>> = items.iter().map(|_| TaskOutcome::Abandoned).collect();
        if slots.is_empty() {
            return slots;
        }

        let mut set = JoinSet::new();
        for (idx, item) in items.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let task = f(item);
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (idx, None);
                };
                let result = AssertUnwindSafe(task)
                    .catch_unwind()
                    .await
                    .map_err(|panic| panic_message(panic.as_ref()));
                (idx, Some(result))
            });
        }

        let total = slots.len();
        let collect = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((idx, Some(Ok(value)))) => slots[idx] = TaskOutcome::Completed(value),
                    Ok((idx, Some(Err(message)))) => slots[idx] = TaskOutcome::Panicked(message),
                    Ok((_, None)) => {}
                    Err(e) => debug!(error = %e, "fan-out task cancelled"),
                }
            }
        };

        if tokio::time::timeout(ceiling, collect).await.is_err() {
            let outstanding = set.len();
            set.abort_all();
            debug!(
                total,
                outstanding,
                ceiling_ms = ceiling.as_millis(),
                "fan-out ceiling reached, abandoning outstanding tasks"
            );
        }

        slots
    }

    /// Closes the pool. Tasks waiting for a permit, and every later batch, are abandoned.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }
}

impl Default for BoundedFanout {
    fn default() -> Self {
        Self::new(Self::default_width())
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
