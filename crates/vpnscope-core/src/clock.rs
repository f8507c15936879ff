//! Time source used for quota window stamps and hard-failure cooldowns.
//!
//! [`SystemClock`] reads tokio's clock, so tests that pause tokio time also control it.
//! [`MockClock`] is available with the `test-helpers` feature or in test builds.

use std::sync::Arc;
use tokio::time::Instant;

/// Port for reading the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by `tokio::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Returns the shared production clock.
#[must_use]
pub fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(any(test, feature = "test-helpers"))]
pub use mock::MockClock;

#[cfg(any(test, feature = "test-helpers"))]
mod mock {
    use super::Clock;
    use parking_lot::Mutex;
    use std::{sync::Arc, time::Duration};
    use tokio::time::Instant;

    /// Manually driven clock.
    ///
    /// Clones share the same underlying time, so advancing one clone advances all of them.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        #[must_use]
        pub fn new(start: Instant) -> Self {
            Self { current: Arc::new(Mutex::new(start)) }
        }

        pub fn advance(&self, duration: Duration) {
            *self.current.lock() += duration;
        }

        pub fn set(&self, instant: Instant) {
            *self.current.lock() = instant;
        }
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self::new(Instant::now())
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock()
        }
    }
}
