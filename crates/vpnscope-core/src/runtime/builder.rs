//! Builder for the vpnscope runtime.

use crate::{
    analytics::RosterAnalytics,
    cache::ResultCache,
    clock::{self, Clock},
    config::{AppConfig, SourceKind},
    metrics::MetricsCollector,
    orchestrator::QueryOrchestrator,
    registry::{RegistryError, SourceRegistry},
    source::{BlocklistError, BlocklistSource, Source, SourceSettings},
};
use std::{collections::HashSet, path::PathBuf, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

use super::lifecycle::VpnScopeRuntime;

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    InvalidConfig(String),

    /// A `plugin` source entry has no matching source supplied to the builder
    #[error("Source '{0}' is configured as a plugin but was not supplied")]
    MissingPlugin(String),

    /// A built-in source could not be loaded
    #[error("Failed to load source '{name}': {source}")]
    SourceLoad {
        name: String,
        #[source]
        source: BlocklistError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Builder for constructing a [`VpnScopeRuntime`].
///
/// Without [`with_config`](Self::with_config) the compiled defaults are used. Sources are
/// registered in configuration order, followed by supplied sources the configuration does not
/// mention (in the order they were supplied, with default settings).
///
/// Build inside a tokio runtime: quota reset tickers are spawned during registration.
#[derive(Default)]
pub struct VpnScopeRuntimeBuilder {
    config: Option<AppConfig>,
    sources: Vec<Arc<dyn Source>>,
    cache: Option<Arc<dyn ResultCache>>,
    metrics: Option<MetricsCollector>,
    clock: Option<Arc<dyn Clock>>,
}

impl VpnScopeRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Supplies a source implemented in code.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Self {
        self.sources.push(source);
        self
    }

    /// Replaces the cache described by `[cache]`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the runtime and registers every source.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the configuration is invalid, a `plugin` entry has no
    /// supplied source, a blocklist cannot be read, or two sources share a name.
    pub fn build(self) -> Result<VpnScopeRuntime, BuildError> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(BuildError::InvalidConfig)?;

        info!(
            environment = %config.environment,
            configured_sources = config.sources.len(),
            supplied_sources = self.sources.len(),
            algorithm = %config.verdict.algorithm,
            "Initializing vpnscope runtime"
        );

        let sources = resolve_sources(&config, self.sources)?;

        let metrics = self.metrics.unwrap_or_default();
        let clock = self.clock.unwrap_or_else(clock::system);

        let registry = Arc::new(
            SourceRegistry::new(config.verdict.algorithm, config.verdict.min_consensus)
                .with_clock(clock)
                .with_metrics(metrics.clone()),
        );
        registry.set_cascade_sequential(config.verdict.cascade_sequential);
        for (source, settings) in sources {
            registry.register(source, settings)?;
        }
        debug!(sources = registry.len(), "Source registry initialized");

        let cache = self.cache.unwrap_or_else(|| config.cache.build());
        let orchestrator = Arc::new(
            QueryOrchestrator::new(
                Arc::clone(&registry),
                cache,
                config.cache.ttl(),
                config.orchestrator.clone(),
            )
            .with_metrics(metrics.clone()),
        );
        debug!("Query orchestrator initialized");

        let analytics = Arc::new(RosterAnalytics::new(Arc::clone(&orchestrator), &config.analytics));

        Ok(VpnScopeRuntime::new(config, registry, orchestrator, analytics, metrics))
    }
}

/// Pairs every source with its registration settings, in registration order.
fn resolve_sources(
    config: &AppConfig,
    supplied: Vec<Arc<dyn Source>>,
) -> Result<Vec<(Arc<dyn Source>, SourceSettings)>, BuildError> {
    let mut supplied: Vec<Option<Arc<dyn Source>>> = supplied.into_iter().map(Some).collect();
    let mut resolved = Vec::with_capacity(config.sources.len() + supplied.len());

    for entry in &config.sources {
        let settings = entry.settings(&config.quota, config.health);
        let source: Arc<dyn Source> = match entry.kind {
            SourceKind::Blocklist => {
                let path = entry.path.clone().unwrap_or_else(PathBuf::new);
                let blocklist = BlocklistSource::from_file(entry.name.as_str(), &path)
                    .map_err(|source| BuildError::SourceLoad { name: entry.name.clone(), source })?;
                Arc::new(blocklist)
            }
            SourceKind::Plugin => supplied
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|s| s.name() == entry.name))
                .and_then(Option::take)
                .ok_or_else(|| BuildError::MissingPlugin(entry.name.clone()))?,
        };
        resolved.push((source, settings));
    }

    let defaults = SourceSettings {
        reset_interval: config.quota.reset_interval(),
        health: config.health,
        ..SourceSettings::default()
    };
    let mut names: HashSet<String> = resolved.iter().map(|(s, _)| s.name().to_string()).collect();
    for source in supplied.into_iter().flatten() {
        if !names.insert(source.name().to_string()) {
            return Err(RegistryError::DuplicateSource(source.name().to_string()).into());
        }
        resolved.push((source, defaults.clone()));
    }

    Ok(resolved)
}
