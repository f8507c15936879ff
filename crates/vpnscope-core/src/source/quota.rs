//! Per-source request quota with a fixed-window reset.
//!
//! The window is reset by a background ticker anchored at registration time rather than
//! lazily on read, so bursty traffic cannot shift the reset schedule.

use crate::clock::Clock;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

/// Default quota window: 24 hours.
pub const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Request counter for one source.
///
/// `used` is the only state mutated concurrently by query execution; it is advanced with an
/// atomic compare-and-increment so the count equals the number of real dispatches.
#[derive(Debug)]
pub struct QuotaWindow {
    limit: Option<u64>,
    used: AtomicU64,
    resets: AtomicU64,
    window_start: Mutex<Instant>,
}

/// Snapshot of a quota window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: u64,
    pub limit: Option<u64>,
    /// Seconds since the current window started.
    pub window_age_secs: u64,
    /// Number of resets since registration.
    pub resets: u64,
}

impl QuotaStatus {
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.used))
    }
}

impl QuotaWindow {
    #[must_use]
    pub fn new(limit: Option<u64>, now: Instant) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            window_start: Mutex::new(now),
        }
    }

    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Reserves one request in the current window.
    ///
    /// Returns `false` without touching the counter when the window is exhausted.
    pub fn try_acquire(&self) -> bool {
        match self.limit {
            None => {
                self.used.fetch_add(1, Ordering::AcqRel);
                true
            }
            Some(limit) => self
                .used
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                    (used < limit).then_some(used + 1)
                })
                .is_ok(),
        }
    }

    /// Starts a new window.
    pub fn reset(&self, now: Instant) {
        let mut start = self.window_start.lock();
        self.used.store(0, Ordering::Release);
        self.resets.fetch_add(1, Ordering::AcqRel);
        *start = now;
    }

    #[must_use]
    pub fn status(&self, now: Instant) -> QuotaStatus {
        let start = *self.window_start.lock();
        QuotaStatus {
            used: self.used(),
            limit: self.limit,
            window_age_secs: now.saturating_duration_since(start).as_secs(),
            resets: self.resets.load(Ordering::Acquire),
        }
    }
}

/// Background task that resets a [`QuotaWindow`] on a fixed schedule.
pub struct QuotaTicker;

impl QuotaTicker {
    /// Spawns the reset loop on the current tokio runtime.
    ///
    /// The first reset fires one `period` after the call. Returns `None` when called outside a
    /// runtime; the window then only resets when the source is re-registered.
    pub fn start(
        source: Arc<str>,
        window: Arc<QuotaWindow>,
        period: Duration,
        clock: Arc<dyn Clock>,
    ) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(source = %source, "no tokio runtime, quota reset ticker not started");
            return None;
        };

        let first_reset = Instant::now() + period;
        Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(first_reset, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let used = window.used();
                window.reset(clock.now());
                debug!(source = %source, used, "quota window reset");
            }
        }))
    }
}
