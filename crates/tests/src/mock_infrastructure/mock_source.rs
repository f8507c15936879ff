//! Scripted reputation source.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use vpnscope_core::{
    errors::SourceError,
    key::{Key, KeyKind},
    source::Source,
};

/// What a [`MockSource`] does for one query.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer the same for every key.
    Answer(bool),
    /// Positive for keys in the set, negative otherwise.
    Flag(HashSet<Key>),
    Fail(SourceError),
    /// Never complete.
    Hang,
    Panic,
}

/// Source whose answers are scripted per call.
///
/// Scripted behaviors are consumed in order, one per query; once the script runs out every
/// query uses the default behavior.
#[derive(Debug)]
pub struct MockSource {
    name: String,
    default: Behavior,
    script: Mutex<VecDeque<Behavior>>,
    delay: Option<Duration>,
    kinds: Option<Vec<KeyKind>>,
    daily_quota: Option<u64>,
    max_concurrency: usize,
    requires_credential: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockSource {
    /// Negative for every key, unlimited quota, 16 concurrent queries.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default: Behavior::Answer(false),
            script: Mutex::new(VecDeque::new()),
            delay: None,
            kinds: None,
            daily_quota: None,
            max_concurrency: 16,
            requires_credential: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn answering(mut self, flagged: bool) -> Self {
        self.default = Behavior::Answer(flagged);
        self
    }

    #[must_use]
    pub fn flagging(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.default = Behavior::Flag(keys.into_iter().collect());
        self
    }

    #[must_use]
    pub fn failing(mut self, error: SourceError) -> Self {
        self.default = Behavior::Fail(error);
        self
    }

    #[must_use]
    pub fn hanging(mut self) -> Self {
        self.default = Behavior::Hang;
        self
    }

    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.default = Behavior::Panic;
        self
    }

    /// Queues a behavior for the next unscripted call.
    #[must_use]
    pub fn then(self, behavior: Behavior) -> Self {
        self.script.lock().push_back(behavior);
        self
    }

    /// Sleeps before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn supporting(mut self, kind: KeyKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    #[must_use]
    pub fn with_daily_quota(mut self, quota: u64) -> Self {
        self.daily_quota = Some(quota);
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    #[must_use]
    pub fn requiring_credential(mut self) -> Self {
        self.requires_credential = true;
        self
    }

    #[must_use]
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of times `query` was entered.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping queries observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Source for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_credential(&self) -> bool {
        self.requires_credential
    }

    fn daily_quota(&self) -> Option<u64> {
        self.daily_quota
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn supports(&self, key: &Key) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| kinds.contains(&key.kind()))
    }

    async fn query(&self, key: &Key) -> Result<bool, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight, &self.peak_in_flight);
        let behavior = self.script.lock().pop_front().unwrap_or_else(|| self.default.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            Behavior::Answer(flagged) => Ok(flagged),
            Behavior::Flag(keys) => Ok(keys.contains(key)),
            Behavior::Fail(error) => Err(error),
            Behavior::Hang => std::future::pending().await,
            Behavior::Panic => panic!("scripted panic in {}", self.name),
        }
    }
}
