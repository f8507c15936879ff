//! # Query Orchestrator
//!
//! Turns a key into a [`Verdict`]:
//!
//! ```text
//! check(key)
//!   │
//!   ├─ cache hit ───────────────────────────────► cached verdict (re-reduced if settings changed)
//!   │
//!   ├─ another check for key in flight ─────────► wait for its verdict
//!   │
//!   └─ dispatch
//!        ├─ concurrent: every enabled source through the shared fan-out pool
//!        └─ sequential cascade: one source at a time, stop at the first positive
//!             │
//!             ▼
//!        reduce ── contributing > 0 ── cache put
//!               └─ nothing contributed ── warn + unverified metric, not cached
//! ```
//!
//! Per-source failures never escape: they are folded into the result set. The only error a
//! caller sees is a malformed key, rejected before any cache lookup or dispatch.

pub mod config;
mod inflight;

pub use config::OrchestratorConfig;

use crate::{
    cache::ResultCache,
    errors::CheckError,
    fanout::{BoundedFanout, TaskOutcome},
    key::Key,
    metrics::MetricsCollector,
    registry::{RegistrySnapshot, SourceRegistry},
    source::{SourceHandle, SourceOutcome, SourceResult},
    verdict::{AlgorithmMethod, Verdict},
};
use arc_swap::ArcSwap;
use inflight::{DispatchMode, InflightChecks, Role};
use std::{sync::Arc, time::Duration};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

pub struct QueryOrchestrator {
    registry: Arc<SourceRegistry>,
    cache: Arc<dyn ResultCache>,
    cache_ttl: Duration,
    config: ArcSwap<OrchestratorConfig>,
    fanout: BoundedFanout,
    inflight: InflightChecks,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("registry", &self.registry)
            .field("cache_ttl", &self.cache_ttl)
            .field("config", &**self.config.load())
            .field("fanout_width", &self.fanout.width())
            .finish_non_exhaustive()
    }
}

impl QueryOrchestrator {
    #[must_use]
    pub fn new(
        registry: Arc<SourceRegistry>,
        cache: Arc<dyn ResultCache>,
        cache_ttl: Duration,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            cache_ttl,
            fanout: BoundedFanout::new(config.max_concurrent_dispatches),
            config: ArcSwap::from_pointee(config),
            inflight: InflightChecks::default(),
            metrics: MetricsCollector::new(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Updates timeouts and de-duplication at runtime.
    ///
    /// The pool width is fixed at construction; a changed `max_concurrent_dispatches` only
    /// takes effect on rebuild.
    pub fn update_config(&self, config: OrchestratorConfig) {
        self.config.store(Arc::new(config));
        info!("orchestrator configuration updated");
    }

    #[must_use]
    pub fn get_config(&self) -> OrchestratorConfig {
        (**self.config.load()).clone()
    }

    /// Checks `key` with the registry's current algorithm.
    pub async fn check(&self, key: &Key) -> Verdict {
        self.check_with(key, None).await
    }

    pub async fn check_consensus(&self, key: &Key) -> Verdict {
        self.check_with(key, Some(AlgorithmMethod::Consensus)).await
    }

    pub async fn check_cascade(&self, key: &Key) -> Verdict {
        self.check_with(key, Some(AlgorithmMethod::Cascade)).await
    }

    /// Parses `raw` and checks it with the current algorithm.
    pub async fn check_str(&self, raw: &str) -> Result<Verdict, CheckError> {
        let key: Key = raw.parse()?;
        Ok(self.check(&key).await)
    }

    /// Drops any cached verdict for `key`.
    pub async fn invalidate(&self, key: &Key) {
        self.cache.invalidate(key).await;
    }

    /// Closes the dispatch pool. Later checks yield unverified verdicts.
    pub fn shutdown(&self) {
        self.fanout.shutdown();
    }

    async fn check_with(&self, key: &Key, requested: Option<AlgorithmMethod>) -> Verdict {
        let started = Instant::now();
        let snapshot = self.registry.snapshot();
        let algorithm = requested.unwrap_or_else(|| snapshot.algorithm());

        if let Some(verdict) = self.cached(key, algorithm, snapshot.min_consensus()).await {
            self.metrics.record_cache_hit();
            return verdict;
        }
        self.metrics.record_cache_miss();

        let mode = if algorithm == AlgorithmMethod::Cascade && snapshot.cascade_sequential() {
            DispatchMode::Sequential
        } else {
            DispatchMode::Concurrent
        };

        let verdict = if self.config.load().dedup_inflight {
            self.dispatch_deduplicated(key, algorithm, mode, &snapshot).await
        } else {
            self.dispatch_and_store(key, algorithm, mode, &snapshot).await
        };

        self.metrics.record_check(algorithm, verdict.flagged, started.elapsed());
        verdict
    }

    /// Looks up `key` and settles the stored result set under the requested settings.
    ///
    /// Partial result sets left by a sequential cascade are ignored for consensus checks.
    async fn cached(&self, key: &Key, algorithm: AlgorithmMethod, threshold: f64) -> Option<Verdict> {
        let cached = self.cache.get(key).await?;
        if !cached.serves(algorithm) {
            debug!(key = %key, algorithm = %algorithm, "cached result set is partial, dispatching");
            return None;
        }
        debug!(key = %key, algorithm = %algorithm, "verdict served from cache");
        let mut verdict = settle(cached, algorithm, threshold);
        verdict.from_cache = true;
        Some(verdict)
    }

    async fn dispatch_deduplicated(
        &self,
        key: &Key,
        algorithm: AlgorithmMethod,
        mode: DispatchMode,
        snapshot: &RegistrySnapshot,
    ) -> Verdict {
        let threshold = snapshot.min_consensus();
        match self.inflight.begin(key, mode) {
            Role::Leader(guard) => {
                // A check that finished between our cache miss and taking the lead has
                // already stored its verdict.
                if let Some(verdict) = self.cached(key, algorithm, threshold).await {
                    guard.complete(&verdict);
                    return verdict;
                }
                let verdict = self.dispatch_and_store(key, algorithm, mode, snapshot).await;
                guard.complete(&verdict);
                verdict
            }
            Role::Follower(mut rx) => {
                match rx.recv().await {
                    Ok(verdict) if verdict.serves(algorithm) => {
                        self.metrics.record_inflight_join();
                        debug!(key = %key, "joined in-flight check");
                        return settle(verdict, algorithm, threshold);
                    }
                    Ok(_) => debug!(key = %key, "in-flight result set is partial, dispatching"),
                    Err(_) => debug!(key = %key, "in-flight check abandoned, dispatching"),
                }
                self.dispatch_and_store(key, algorithm, mode, snapshot).await
            }
        }
    }

    async fn dispatch_and_store(
        &self,
        key: &Key,
        algorithm: AlgorithmMethod,
        mode: DispatchMode,
        snapshot: &RegistrySnapshot,
    ) -> Verdict {
        let sources: Vec<Arc<SourceHandle>> =
            snapshot.enabled_sources().filter(|h| h.supports(key)).cloned().collect();
        let queried = sources.len();

        let results = match mode {
            DispatchMode::Sequential => self.dispatch_sequential(key, &sources).await,
            DispatchMode::Concurrent => self.dispatch_concurrent(key, sources).await,
        };

        let complete = results.len() == queried;
        let mut verdict = Verdict::reduce(key.clone(), algorithm, snapshot.min_consensus(), results);
        if !complete {
            verdict = verdict.partial();
        }

        if verdict.is_verified() {
            self.cache.put(key.clone(), verdict.clone(), self.cache_ttl).await;
        } else {
            self.metrics.record_unverified_check();
            warn!(
                key = %key,
                sources = verdict.results.len(),
                timed_out = verdict.timed_out_count(),
                "no source produced a usable answer, verdict not cached"
            );
        }

        debug!(
            key = %key,
            algorithm = %algorithm,
            flagged = verdict.flagged,
            confidence = verdict.confidence,
            contributing = verdict.contributing_count(),
            complete,
            "check complete"
        );
        verdict
    }

    async fn dispatch_concurrent(&self, key: &Key, sources: Vec<Arc<SourceHandle>>) -> Vec<SourceResult> {
        let config = self.config.load_full();
        let source_timeout = config.source_timeout();
        let names: Vec<Arc<str>> = sources.iter().map(|h| Arc::from(h.name())).collect();

        let dispatch_key = key.clone();
        let outcomes = self
            .fanout
            .run(sources, config.check_ceiling(), move |handle| {
                let key = dispatch_key.clone();
                async move { handle.dispatch(&key, source_timeout).await }
            })
            .await;

        names
            .into_iter()
            .zip(outcomes)
            .map(|(name, outcome)| match outcome {
                TaskOutcome::Completed(result) => result,
                TaskOutcome::Panicked(message) => SourceResult::new(
                    name,
                    SourceOutcome::Failed { reason: format!("dispatch panicked: {message}"), hard: false },
                ),
                TaskOutcome::Abandoned => {
                    debug!(source = %name, key = %key, "source abandoned at check ceiling");
                    SourceResult::new(name, SourceOutcome::TimedOut)
                }
            })
            .collect()
    }

    async fn dispatch_sequential(&self, key: &Key, sources: &[Arc<SourceHandle>]) -> Vec<SourceResult> {
        let config = self.config.load_full();
        let source_timeout = config.source_timeout();
        let mut results = Vec::with_capacity(sources.len());

        let run = async {
            for handle in sources {
                let result = handle.dispatch(key, source_timeout).await;
                let hit = result.outcome.is_positive();
                results.push(result);
                if hit {
                    break;
                }
            }
        };

        if timeout(config.check_ceiling(), run).await.is_err() {
            for handle in &sources[results.len()..] {
                debug!(source = %handle.name(), key = %key, "source abandoned at check ceiling");
                results.push(SourceResult::new(handle.name(), SourceOutcome::TimedOut));
            }
        }
        results
    }
}

fn settle(verdict: Verdict, algorithm: AlgorithmMethod, threshold: f64) -> Verdict {
    if verdict.matches(algorithm, threshold) {
        verdict
    } else {
        verdict.rereduce(algorithm, threshold)
    }
}
