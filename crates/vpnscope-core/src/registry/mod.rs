//! Registered sources and process-wide verdict settings.
//!
//! The registry is read on every check and written only by administrative actions. All state
//! lives in one immutable [`RegistrySnapshot`] behind an `ArcSwap`; writers publish a modified
//! copy with `rcu`, and a check keeps the snapshot it loaded for its whole lifetime, so
//! reconfiguration never blocks or alters an in-flight check.

use crate::{
    clock::{self, Clock},
    metrics::MetricsCollector,
    source::{HealthStatus, QuotaStatus, Source, SourceHandle, SourceSettings},
    verdict::{AlgorithmMethod, DEFAULT_MIN_CONSENSUS},
};
use arc_swap::ArcSwap;
use serde::Serialize;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("source '{0}' is already registered")]
    DuplicateSource(String),

    #[error("source '{0}' is not registered")]
    UnknownSource(String),

    #[error("consensus threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),
}

/// A source handle plus its administrative enable flag.
#[derive(Debug, Clone)]
pub struct RegisteredSource {
    pub handle: Arc<SourceHandle>,
    pub enabled: bool,
}

/// Immutable view of the registry.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    sources: Vec<RegisteredSource>,
    algorithm: AlgorithmMethod,
    min_consensus: f64,
    cascade_sequential: bool,
}

impl RegistrySnapshot {
    /// Enabled sources in registration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &Arc<SourceHandle>> + '_ {
        self.sources.iter().filter(|s| s.enabled).map(|s| &s.handle)
    }

    #[must_use]
    pub fn sources(&self) -> &[RegisteredSource] {
        &self.sources
    }

    #[must_use]
    pub fn algorithm(&self) -> AlgorithmMethod {
        self.algorithm
    }

    #[must_use]
    pub fn min_consensus(&self) -> f64 {
        self.min_consensus
    }

    /// Whether cascade checks dispatch one source at a time and stop at the first positive.
    #[must_use]
    pub fn cascade_sequential(&self) -> bool {
        self.cascade_sequential
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.handle.name() == name)
    }
}

/// Per-source status for administration and display.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub enabled: bool,
    pub requires_credential: bool,
    pub max_concurrency: usize,
    pub quota: QuotaStatus,
    pub health: HealthStatus,
}

pub struct SourceRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry").field("sources", &self.len()).finish_non_exhaustive()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new(AlgorithmMethod::default(), DEFAULT_MIN_CONSENSUS)
    }
}

impl SourceRegistry {
    /// Creates an empty registry. Out-of-range thresholds are clamped to `[0, 1]`.
    #[must_use]
    pub fn new(algorithm: AlgorithmMethod, min_consensus: f64) -> Self {
        let min_consensus =
            if min_consensus.is_nan() { DEFAULT_MIN_CONSENSUS } else { min_consensus.clamp(0.0, 1.0) };
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot {
                sources: Vec::new(),
                algorithm,
                min_consensus,
                cascade_sequential: false,
            }),
            clock: clock::system(),
            metrics: MetricsCollector::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    fn handle(&self, source: Arc<dyn Source>, settings: &SourceSettings) -> Arc<SourceHandle> {
        Arc::new(SourceHandle::new(
            source,
            settings,
            Arc::clone(&self.clock),
            self.metrics.clone(),
        ))
    }

    /// Registers a source at the end of the dispatch order and starts its quota ticker.
    pub fn register(
        &self,
        source: Arc<dyn Source>,
        settings: SourceSettings,
    ) -> Result<(), RegistryError> {
        let name = source.name().to_string();
        if self.snapshot.load().position(&name).is_some() {
            return Err(RegistryError::DuplicateSource(name));
        }

        let entry = RegisteredSource { handle: self.handle(source, &settings), enabled: settings.enabled };
        let mut result = Ok(());
        self.snapshot.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            if next.position(&name).is_some() {
                result = Err(RegistryError::DuplicateSource(name.clone()));
            } else {
                result = Ok(());
                next.sources.push(entry.clone());
            }
            next
        });

        if result.is_ok() {
            info!(source = %name, enabled = settings.enabled, "registered source");
        }
        result
    }

    /// Removes a source. Checks that already loaded a snapshot still dispatch it.
    pub fn unregister(&self, name: &str) -> Result<Arc<SourceHandle>, RegistryError> {
        let mut removed = None;
        self.snapshot.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            removed = next.position(name).map(|idx| next.sources.remove(idx).handle);
            next
        });

        let handle = removed.ok_or_else(|| RegistryError::UnknownSource(name.to_string()))?;
        info!(source = %name, "unregistered source");
        Ok(handle)
    }

    /// Replaces the whole source set, e.g. on configuration reload.
    ///
    /// Every source gets a fresh handle: quota windows, health and tickers start over.
    pub fn replace_sources(
        &self,
        sources: Vec<(Arc<dyn Source>, SourceSettings)>,
    ) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for (source, _) in &sources {
            if !seen.insert(source.name().to_string()) {
                return Err(RegistryError::DuplicateSource(source.name().to_string()));
            }
        }

        let entries: Vec<RegisteredSource> = sources
            .into_iter()
            .map(|(source, settings)| RegisteredSource {
                handle: self.handle(source, &settings),
                enabled: settings.enabled,
            })
            .collect();
        let count = entries.len();

        let previous = self.snapshot.rcu(|current| RegistrySnapshot {
            sources: entries.clone(),
            ..RegistrySnapshot::clone(current)
        });
        for entry in &previous.sources {
            entry.handle.shutdown();
        }

        info!(sources = count, "replaced source set");
        Ok(())
    }

    /// Enables or disables a source. Enabling clears any hard-failure cooldown or disable.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), RegistryError> {
        let mut found = None;
        self.snapshot.rcu(|current| {
            let mut next = RegistrySnapshot::clone(current);
            found = next.position(name).map(|idx| {
                next.sources[idx].enabled = enabled;
                Arc::clone(&next.sources[idx].handle)
            });
            next
        });

        let handle = found.ok_or_else(|| RegistryError::UnknownSource(name.to_string()))?;
        if enabled {
            handle.health().clear();
        }
        info!(source = %name, enabled, "source enable flag changed");
        Ok(())
    }

    pub fn set_algorithm(&self, algorithm: AlgorithmMethod) {
        self.snapshot.rcu(|current| RegistrySnapshot { algorithm, ..RegistrySnapshot::clone(current) });
        info!(algorithm = %algorithm, "verdict algorithm changed");
    }

    pub fn set_min_consensus(&self, threshold: f64) -> Result<(), RegistryError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RegistryError::InvalidThreshold(threshold));
        }
        self.snapshot.rcu(|current| RegistrySnapshot {
            min_consensus: threshold,
            ..RegistrySnapshot::clone(current)
        });
        info!(min_consensus = threshold, "consensus threshold changed");
        Ok(())
    }

    /// Replaces algorithm, threshold and cascade mode in one snapshot, so no check observes a
    /// mix of old and new settings. An invalid threshold leaves all three unchanged.
    pub fn apply_settings(
        &self,
        algorithm: AlgorithmMethod,
        min_consensus: f64,
        cascade_sequential: bool,
    ) -> Result<(), RegistryError> {
        if !(0.0..=1.0).contains(&min_consensus) {
            return Err(RegistryError::InvalidThreshold(min_consensus));
        }
        self.snapshot.rcu(|current| RegistrySnapshot {
            algorithm,
            min_consensus,
            cascade_sequential,
            ..RegistrySnapshot::clone(current)
        });
        info!(algorithm = %algorithm, min_consensus, cascade_sequential, "verdict settings changed");
        Ok(())
    }

    pub fn set_cascade_sequential(&self, sequential: bool) {
        self.snapshot.rcu(|current| RegistrySnapshot {
            cascade_sequential: sequential,
            ..RegistrySnapshot::clone(current)
        });
        info!(sequential, "cascade dispatch mode changed");
    }

    /// Enabled sources in registration order.
    #[must_use]
    pub fn enabled_sources(&self) -> Vec<Arc<SourceHandle>> {
        self.snapshot.load().enabled_sources().cloned().collect()
    }

    #[must_use]
    pub fn current_algorithm(&self) -> AlgorithmMethod {
        self.snapshot.load().algorithm
    }

    #[must_use]
    pub fn min_consensus_threshold(&self) -> f64 {
        self.snapshot.load().min_consensus
    }

    #[must_use]
    pub fn source(&self, name: &str) -> Option<Arc<SourceHandle>> {
        let snapshot = self.snapshot.load();
        snapshot.position(name).map(|idx| Arc::clone(&snapshot.sources[idx].handle))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<SourceStatus> {
        self.snapshot
            .load()
            .sources
            .iter()
            .map(|entry| SourceStatus {
                name: entry.handle.name().to_string(),
                enabled: entry.enabled,
                requires_credential: entry.handle.requires_credential(),
                max_concurrency: entry.handle.max_concurrency(),
                quota: entry.handle.quota_status(),
                health: entry.handle.health_status(),
            })
            .collect()
    }

    /// Stops every quota ticker and rejects further dispatches.
    pub fn shutdown(&self) {
        for entry in &self.snapshot.load().sources {
            entry.handle.shutdown();
        }
    }
}
