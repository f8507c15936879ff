//! In-flight check de-duplication.
//!
//! The first check for a key becomes the leader and registers a broadcast sender; checks that
//! arrive before it finishes subscribe and wait for the leader's verdict instead of
//! dispatching again.
//!
//! ```text
//! begin(key) ──┬── vacant ──► Leader(guard) ── dispatch ── guard.complete(verdict)
//!              │                                              │ remove entry, then send
//!              └── occupied ► Follower(rx) ◄──────────────────┘
//!                                 │
//!                                 └── sender dropped without a verdict ► dispatch itself
//! ```
//!
//! Subscribing happens under the map's shard lock and the leader removes the entry before
//! sending, so every follower that found the entry receives the verdict.
//!
//! Entries are keyed by key and dispatch mode, not by algorithm: a full result set settles
//! either algorithm, so a consensus check and a concurrent cascade check share one dispatch.
//! A sequential cascade stops early and only shares with other sequential cascades.

use crate::{key::Key, verdict::Verdict};
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use tokio::sync::broadcast;

/// How a check queries its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DispatchMode {
    /// Every enabled source through the fan-out pool.
    Concurrent,
    /// One source at a time, stopping at the first positive.
    Sequential,
}

type InflightKey = (Key, DispatchMode);

#[derive(Debug, Default)]
pub(crate) struct InflightChecks {
    entries: Arc<DashMap<InflightKey, broadcast::Sender<Verdict>>>,
}

pub(crate) enum Role {
    Leader(InflightGuard),
    Follower(broadcast::Receiver<Verdict>),
}

impl InflightChecks {
    pub(crate) fn begin(&self, key: &Key, mode: DispatchMode) -> Role {
        let inflight_key = (key.clone(), mode);
        match self.entries.entry(inflight_key.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx.clone());
                Role::Leader(InflightGuard {
                    entries: Arc::clone(&self.entries),
                    key: Some(inflight_key),
                    tx,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Leader's claim on a key. Dropping it without completing releases the key, and followers
/// observe a closed channel.
pub(crate) struct InflightGuard {
    entries: Arc<DashMap<InflightKey, broadcast::Sender<Verdict>>>,
    key: Option<InflightKey>,
    tx: broadcast::Sender<Verdict>,
}

impl InflightGuard {
    fn release(&mut self) {
        if let Some(key) = self.key.take() {
            self.entries.remove_if(&key, |_, tx| tx.same_channel(&self.tx));
        }
    }

    /// Publishes the verdict to every follower.
    pub(crate) fn complete(mut self, verdict: &Verdict) {
        self.release();
        // No receivers is fine: nobody joined.
        let _ = self.tx.send(verdict.clone());
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.release();
    }
}
