//! Runtime lifecycle management: live reconfiguration and shutdown.

use crate::{
    analytics::RosterAnalytics,
    config::AppConfig,
    metrics::MetricsCollector,
    orchestrator::QueryOrchestrator,
    registry::SourceRegistry,
};
use arc_swap::ArcSwap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::builder::{BuildError, VpnScopeRuntimeBuilder};

/// Owns the initialized components.
///
/// Components are shared through `Arc`, so a host can hand the orchestrator or analytics
/// adapter to its own tasks. [`shutdown`](Self::shutdown) stops quota tickers and closes both
/// fan-out pools; checks issued afterwards resolve as unverified.
pub struct VpnScopeRuntime {
    config: ArcSwap<AppConfig>,
    registry: Arc<SourceRegistry>,
    orchestrator: Arc<QueryOrchestrator>,
    analytics: Arc<RosterAnalytics>,
    metrics: MetricsCollector,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_initiated: AtomicBool,
}

impl std::fmt::Debug for VpnScopeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VpnScopeRuntime")
            .field("registry", &self.registry)
            .field("orchestrator", &self.orchestrator)
            .field("shutdown_initiated", &self.shutdown_initiated.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl VpnScopeRuntime {
    #[must_use]
    pub fn builder() -> VpnScopeRuntimeBuilder {
        VpnScopeRuntimeBuilder::new()
    }

    pub(super) fn new(
        config: AppConfig,
        registry: Arc<SourceRegistry>,
        orchestrator: Arc<QueryOrchestrator>,
        analytics: Arc<RosterAnalytics>,
        metrics: MetricsCollector,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config: ArcSwap::from_pointee(config),
            registry,
            orchestrator,
            analytics,
            metrics,
            shutdown_tx,
            shutdown_initiated: AtomicBool::new(false),
        }
    }

    /// Configuration currently in effect.
    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<QueryOrchestrator> {
        &self.orchestrator
    }

    #[must_use]
    pub fn analytics(&self) -> &Arc<RosterAnalytics> {
        &self.analytics
    }

    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Creates a receiver that fires once [`shutdown`](Self::shutdown) runs.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Applies a reloaded configuration without rebuilding.
    ///
    /// Algorithm, threshold, sequential cascade, per-source enabled flags and orchestrator
    /// budgets take effect for checks that start afterwards. Adding or removing sources,
    /// quota overrides, cache settings and pool widths need a rebuild; entries naming
    /// unregistered sources are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidConfig`] and leaves the running configuration untouched if
    /// `config` fails validation.
    pub fn reconfigure(&self, config: &AppConfig) -> Result<(), BuildError> {
        config.validate().map_err(BuildError::InvalidConfig)?;

        self.registry.apply_settings(
            config.verdict.algorithm,
            config.verdict.min_consensus,
            config.verdict.cascade_sequential,
        )?;

        let snapshot = self.registry.snapshot();
        for entry in &config.sources {
            let current = snapshot
                .sources()
                .iter()
                .find(|registered| registered.handle.name() == entry.name)
                .map(|registered| registered.enabled);
            match current {
                Some(enabled) if enabled != entry.enabled => {
                    self.registry.set_enabled(&entry.name, entry.enabled)?;
                }
                Some(_) => {}
                None => warn!(source = %entry.name, "configured source is not registered, skipping"),
            }
        }

        self.orchestrator.update_config(config.orchestrator.clone());
        self.config.store(Arc::new(config.clone()));
        info!(
            algorithm = %config.verdict.algorithm,
            min_consensus = config.verdict.min_consensus,
            "vpnscope runtime reconfigured"
        );
        Ok(())
    }

    /// Stops quota tickers and closes the dispatch and analytics pools.
    ///
    /// Idempotent; cached verdicts are left in place.
    pub fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating vpnscope runtime shutdown");
        // No receivers is fine.
        let _ = self.shutdown_tx.send(());

        self.analytics.shutdown();
        self.orchestrator.shutdown();
        self.registry.shutdown();
        info!("vpnscope runtime shutdown complete");
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<VpnScopeRuntime>;
    let _ = assert_sync::<VpnScopeRuntime>;
};
